//! Persisted model artifacts and the immutable bundle loaded at startup.
//!
//! A model directory holds:
//!
//! - `investment_classifier.json`: [`RandomForestClassifier`]
//! - `zip_ranker.json`: [`RandomForestRegressor`]
//! - `classifier_scaler.json` / `ranker_scaler.json`: one [`StandardScaler`] per model
//! - `model_info.json`: [`ModelInfo`], including a SHA-256 digest of each file above
//! - `test_data.json`: the holdout split, for offline evaluation
//!
//! Loading fails on the first missing, unparsable, mismatched or tampered file.

use crate::errors::ModelError;
use crate::features::{self, FeatureVector};
use crate::forest::{RandomForestClassifier, RandomForestRegressor};
use crate::integrity;
use crate::models::ModelScores;
use crate::scaler::StandardScaler;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const CLASSIFIER_FILE: &str = "investment_classifier.json";
pub const RANKER_FILE: &str = "zip_ranker.json";
pub const CLASSIFIER_SCALER_FILE: &str = "classifier_scaler.json";
pub const RANKER_SCALER_FILE: &str = "ranker_scaler.json";
pub const MODEL_INFO_FILE: &str = "model_info.json";
pub const TEST_DATA_FILE: &str = "test_data.json";
pub const RESULTS_DIR: &str = "results";
pub const EVALUATION_FILE: &str = "evaluation.json";

/// Medians of key metrics over the holdout split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetThresholds {
    pub price_to_rent_median: f64,
    pub market_heat_median: f64,
    pub days_pending_median: f64,
}

/// Holdout metrics of one training run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub classifier_accuracy: f64,
    pub ranker_r2: f64,
    pub n_train: usize,
    pub n_test: usize,
    /// Composite score at the label quantile.
    pub label_threshold: f64,
    /// Share of the population labelled good.
    pub positive_rate: f64,
}

/// Metadata served alongside every ZIP analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub feature_names: Vec<String>,
    pub target_thresholds: TargetThresholds,
    pub run_id: Uuid,
    pub trained_at: DateTime<Utc>,
    pub metrics: TrainingMetrics,
    /// File name -> hex SHA-256. Filled in by [`ModelBundle::save`].
    #[serde(default)]
    pub artifact_digests: BTreeMap<String, String>,
}

/// Classifier, ranker and their scalers. Read-only once built.
#[derive(Debug, Clone)]
pub struct ModelBundle {
    classifier: RandomForestClassifier,
    ranker: RandomForestRegressor,
    classifier_scaler: StandardScaler,
    ranker_scaler: StandardScaler,
    info: ModelInfo,
}

fn read_artifact(dir: &Path, name: &str) -> Result<Vec<u8>, ModelError> {
    let path = dir.join(name);
    std::fs::read(&path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ModelError::MissingArtifact { path }
        } else {
            ModelError::Io { path, source }
        }
    })
}

fn as_utf8<'a>(name: &str, bytes: &'a [u8]) -> Result<&'a str, ModelError> {
    std::str::from_utf8(bytes)
        .map_err(|_| ModelError::InvalidModel(format!("{} is not valid UTF-8", name)))
}

pub(crate) fn write_file(path: PathBuf, data: &[u8]) -> Result<(), ModelError> {
    std::fs::write(&path, data).map_err(|source| ModelError::Io { path, source })
}

pub(crate) fn ensure_dir(dir: &Path) -> Result<(), ModelError> {
    std::fs::create_dir_all(dir).map_err(|source| ModelError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

impl ModelBundle {
    pub fn new(
        classifier: RandomForestClassifier,
        ranker: RandomForestRegressor,
        classifier_scaler: StandardScaler,
        ranker_scaler: StandardScaler,
        info: ModelInfo,
    ) -> Result<Self, ModelError> {
        let expected = features::feature_names();
        if info.feature_names != expected {
            return Err(ModelError::FeatureMismatch {
                artifact: MODEL_INFO_FILE.to_string(),
                expected,
                actual: info.feature_names,
            });
        }
        classifier_scaler.validate(CLASSIFIER_SCALER_FILE)?;
        ranker_scaler.validate(RANKER_SCALER_FILE)?;

        Ok(Self {
            classifier,
            ranker,
            classifier_scaler,
            ranker_scaler,
            info,
        })
    }

    /// Loads and cross-checks every artifact in `dir`.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, ModelError> {
        let dir = dir.as_ref();
        let info_bytes = read_artifact(dir, MODEL_INFO_FILE)?;
        let info: ModelInfo = serde_json::from_slice(&info_bytes).map_err(|source| {
            ModelError::Parse {
                artifact: MODEL_INFO_FILE.to_string(),
                source,
            }
        })?;

        let verified = |name: &str| -> Result<Vec<u8>, ModelError> {
            let bytes = read_artifact(dir, name)?;
            let digest = info.artifact_digests.get(name).ok_or_else(|| {
                ModelError::InvalidModel(format!("{} records no digest for {}", MODEL_INFO_FILE, name))
            })?;
            integrity::verify_digest(name, &bytes, digest)?;
            Ok(bytes)
        };

        let classifier_bytes = verified(CLASSIFIER_FILE)?;
        let ranker_bytes = verified(RANKER_FILE)?;
        let clf_scaler_bytes = verified(CLASSIFIER_SCALER_FILE)?;
        let rank_scaler_bytes = verified(RANKER_SCALER_FILE)?;

        let classifier =
            RandomForestClassifier::from_json_str(as_utf8(CLASSIFIER_FILE, &classifier_bytes)?)?;
        let ranker = RandomForestRegressor::from_json_str(as_utf8(RANKER_FILE, &ranker_bytes)?)?;
        let classifier_scaler = StandardScaler::from_json_str(
            as_utf8(CLASSIFIER_SCALER_FILE, &clf_scaler_bytes)?,
            CLASSIFIER_SCALER_FILE,
        )?;
        let ranker_scaler = StandardScaler::from_json_str(
            as_utf8(RANKER_SCALER_FILE, &rank_scaler_bytes)?,
            RANKER_SCALER_FILE,
        )?;

        let bundle = Self::new(classifier, ranker, classifier_scaler, ranker_scaler, info)?;
        tracing::info!(
            "Loaded model bundle from {} (run {}, trained {})",
            dir.display(),
            bundle.info.run_id,
            bundle.info.trained_at
        );
        Ok(bundle)
    }

    /// Writes every artifact to `dir` and records their digests in `model_info.json`.
    pub fn save(&mut self, dir: impl AsRef<Path>) -> Result<(), ModelError> {
        let dir = dir.as_ref();
        ensure_dir(dir)?;

        let artifacts = [
            (CLASSIFIER_FILE, self.classifier.to_json_string()?),
            (RANKER_FILE, self.ranker.to_json_string()?),
            (CLASSIFIER_SCALER_FILE, self.classifier_scaler.to_json_string()?),
            (RANKER_SCALER_FILE, self.ranker_scaler.to_json_string()?),
        ];
        for (name, json) in &artifacts {
            write_file(dir.join(name), json.as_bytes())?;
            self.info
                .artifact_digests
                .insert(name.to_string(), integrity::sha256_hex(json.as_bytes()));
        }

        let info_json =
            serde_json::to_string_pretty(&self.info).map_err(|source| ModelError::Parse {
                artifact: MODEL_INFO_FILE.to_string(),
                source,
            })?;
        write_file(dir.join(MODEL_INFO_FILE), info_json.as_bytes())?;
        tracing::info!("Saved model artifacts to {}", dir.display());
        Ok(())
    }

    /// Positive-class probability through the classifier pipeline.
    pub fn investment_score(&self, features: &FeatureVector) -> f64 {
        self.classifier
            .predict_probability(&self.classifier_scaler.transform(features))
    }

    /// Composite-score estimate through the ranker pipeline.
    pub fn ranking_score(&self, features: &FeatureVector) -> f64 {
        self.ranker.predict(&self.ranker_scaler.transform(features))
    }

    pub fn score(&self, features: &FeatureVector) -> ModelScores {
        ModelScores {
            investment_score: self.investment_score(features),
            ranking_score: self.ranking_score(features),
        }
    }

    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    pub fn classifier(&self) -> &RandomForestClassifier {
        &self.classifier
    }

    pub fn ranker(&self) -> &RandomForestRegressor {
        &self.ranker
    }

    pub fn classifier_scaler(&self) -> &StandardScaler {
        &self.classifier_scaler
    }

    pub fn ranker_scaler(&self) -> &StandardScaler {
        &self.ranker_scaler
    }
}
