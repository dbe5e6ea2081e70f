//! Offline training: labels, holdout split, fitting and persistence.

use crate::artifacts::{
    self, ModelBundle, ModelInfo, TargetThresholds, TrainingMetrics, TEST_DATA_FILE,
};
use crate::composer::{self, Composition};
use crate::errors::ModelError;
use crate::features::{self, FeatureVector};
use crate::forest::{ForestParams, RandomForestClassifier, RandomForestRegressor};
use crate::models::RegionMetrics;
use crate::scaler::StandardScaler;
use crate::weights::ScoreWeights;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Smallest population that leaves both a train and a test split.
pub const MIN_TRAINING_RECORDS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingConfig {
    pub weights: ScoreWeights,
    pub test_fraction: f64,
    pub split_seed: u64,
    pub classifier: ForestParams,
    pub ranker: ForestParams,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            test_fraction: 0.2,
            split_seed: 42,
            classifier: ForestParams::classifier(),
            ranker: ForestParams::regressor(),
        }
    }
}

/// Shuffled `(train, test)` row indices. The test split holds `ceil(n * test_fraction)` rows.
pub fn train_test_split(
    n: usize,
    test_fraction: f64,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>), ModelError> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(ModelError::Training(format!(
            "test fraction must be within (0, 1), got {}",
            test_fraction
        )));
    }
    let n_test = (n as f64 * test_fraction).ceil() as usize;
    if n < 2 || n_test >= n {
        return Err(ModelError::Training(format!(
            "{} rows cannot be split into train and test sets",
            n
        )));
    }

    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);
    let train = order.split_off(n_test);
    Ok((train, order))
}

/// The test split, persisted for later evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldoutSet {
    pub zip_codes: Vec<String>,
    /// Unscaled feature vectors.
    pub features: Vec<FeatureVector>,
    pub labels: Vec<bool>,
    pub scores: Vec<f64>,
}

impl HoldoutSet {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn save(&self, dir: impl AsRef<Path>) -> Result<(), ModelError> {
        let dir = dir.as_ref();
        artifacts::ensure_dir(dir)?;
        let json = serde_json::to_string(self).map_err(|source| ModelError::Parse {
            artifact: TEST_DATA_FILE.to_string(),
            source,
        })?;
        artifacts::write_file(dir.join(TEST_DATA_FILE), json.as_bytes())
    }

    pub fn load(dir: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = dir.as_ref().join(TEST_DATA_FILE);
        let bytes = std::fs::read(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ModelError::MissingArtifact { path: path.clone() }
            } else {
                ModelError::Io {
                    path: path.clone(),
                    source,
                }
            }
        })?;
        let holdout: Self = serde_json::from_slice(&bytes).map_err(|source| ModelError::Parse {
            artifact: TEST_DATA_FILE.to_string(),
            source,
        })?;
        let n = holdout.features.len();
        if holdout.labels.len() != n || holdout.scores.len() != n || holdout.zip_codes.len() != n {
            return Err(ModelError::InvalidModel(format!(
                "{} columns have different lengths",
                TEST_DATA_FILE
            )));
        }
        Ok(holdout)
    }
}

/// Drops rows with non-positive home value, rent, days-pending or heat, and
/// rows with any non-finite metric.
pub fn clean_population(records: Vec<RegionMetrics>) -> Vec<RegionMetrics> {
    let before = records.len();
    let kept: Vec<RegionMetrics> = records
        .into_iter()
        .filter(|r| {
            let positive = [
                r.median_home_value,
                r.median_rent,
                r.days_pending,
                r.market_heat,
            ];
            positive.iter().all(|v| v.is_finite() && *v > 0.0) && r.price_cuts_percent.is_finite()
        })
        .collect();
    if kept.len() < before {
        tracing::warn!(
            "Dropped {} of {} training records with missing or invalid metrics",
            before - kept.len(),
            before
        );
    }
    kept
}

#[derive(Debug)]
pub struct TrainingOutcome {
    pub bundle: ModelBundle,
    pub holdout: HoldoutSet,
    pub composition: Composition,
}

impl TrainingOutcome {
    pub fn metrics(&self) -> &TrainingMetrics {
        &self.bundle.info().metrics
    }
}

fn select<T: Clone>(values: &[T], idx: &[usize]) -> Vec<T> {
    idx.iter().map(|&i| values[i].clone()).collect()
}

fn median_of(rows: &[FeatureVector], column: usize) -> f64 {
    let values: Vec<f64> = rows.iter().map(|r| r[column]).collect();
    composer::median(&values).unwrap_or(f64::NAN)
}

/// Fits both pipelines on `records` and evaluates them on the holdout split.
pub fn train(records: &[RegionMetrics], config: &TrainingConfig) -> Result<TrainingOutcome, ModelError> {
    if records.len() < MIN_TRAINING_RECORDS {
        return Err(ModelError::Training(format!(
            "need at least {} records, got {}",
            MIN_TRAINING_RECORDS,
            records.len()
        )));
    }
    tracing::info!("Training on {} records", records.len());

    let composition = composer::compose(records, &config.weights)?;
    let x = records
        .iter()
        .map(features::feature_vector)
        .collect::<Result<Vec<_>, _>>()?;

    let (train_idx, test_idx) =
        train_test_split(records.len(), config.test_fraction, config.split_seed)?;
    let x_train = select(&x, &train_idx);
    let x_test = select(&x, &test_idx);
    let labels_train = select(&composition.labels, &train_idx);
    let labels_test = select(&composition.labels, &test_idx);
    let scores_train = select(&composition.scores, &train_idx);
    let scores_test = select(&composition.scores, &test_idx);

    let classifier_scaler = StandardScaler::fit(&x_train)?;
    let classifier = RandomForestClassifier::fit(
        &classifier_scaler.transform_all(&x_train),
        &labels_train,
        config.classifier,
    )?;
    let classifier_accuracy =
        classifier.accuracy(&classifier_scaler.transform_all(&x_test), &labels_test);
    tracing::info!("Classification model accuracy: {:.2}", classifier_accuracy);

    let ranker_scaler = StandardScaler::fit(&x_train)?;
    let ranker = RandomForestRegressor::fit(
        &ranker_scaler.transform_all(&x_train),
        &scores_train,
        config.ranker,
    )?;
    let ranker_r2 = ranker.r2_score(&ranker_scaler.transform_all(&x_test), &scores_test);
    tracing::info!("Ranking model R² score: {:.2}", ranker_r2);

    let info = ModelInfo {
        feature_names: features::feature_names(),
        target_thresholds: TargetThresholds {
            price_to_rent_median: median_of(&x_test, 5),
            market_heat_median: median_of(&x_test, 4),
            days_pending_median: median_of(&x_test, 2),
        },
        run_id: Uuid::new_v4(),
        trained_at: Utc::now(),
        metrics: TrainingMetrics {
            classifier_accuracy,
            ranker_r2,
            n_train: train_idx.len(),
            n_test: test_idx.len(),
            label_threshold: composition.threshold,
            positive_rate: composition.positive_rate(),
        },
        artifact_digests: Default::default(),
    };

    let bundle = ModelBundle::new(classifier, ranker, classifier_scaler, ranker_scaler, info)?;
    let holdout = HoldoutSet {
        zip_codes: select(
            &records.iter().map(|r| r.zip_code.clone()).collect::<Vec<_>>(),
            &test_idx,
        ),
        features: x_test,
        labels: labels_test,
        scores: scores_test,
    };

    Ok(TrainingOutcome {
        bundle,
        holdout,
        composition,
    })
}

/// Trains, then writes the bundle and holdout split to `dir`.
pub fn train_and_save(
    records: &[RegionMetrics],
    config: &TrainingConfig,
    dir: impl AsRef<Path>,
) -> Result<TrainingOutcome, ModelError> {
    let dir = dir.as_ref();
    let mut outcome = train(records, config)?;
    outcome.bundle.save(dir)?;
    outcome.holdout.save(dir)?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sizes_and_disjointness() {
        let (train, test) = train_test_split(101, 0.2, 42).unwrap();
        assert_eq!(test.len(), 21);
        assert_eq!(train.len(), 80);
        let mut all: Vec<usize> = train.iter().chain(&test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..101).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_is_deterministic() {
        assert_eq!(
            train_test_split(50, 0.2, 42).unwrap(),
            train_test_split(50, 0.2, 42).unwrap()
        );
        assert_ne!(
            train_test_split(50, 0.2, 42).unwrap().1,
            train_test_split(50, 0.2, 7).unwrap().1
        );
    }

    #[test]
    fn test_split_rejects_degenerate_inputs() {
        assert!(train_test_split(1, 0.2, 42).is_err());
        assert!(train_test_split(10, 0.0, 42).is_err());
        assert!(train_test_split(10, 1.0, 42).is_err());
    }

    #[test]
    fn test_clean_population_drops_invalid_rows() {
        let good = RegionMetrics {
            zip_code: "394913".to_string(),
            region_id: "394913".to_string(),
            city: String::new(),
            state: "NY".to_string(),
            msa_name: "New York, NY".to_string(),
            median_home_value: 650_000.0,
            median_rent: 3_100.0,
            days_pending: 35.0,
            price_cuts_percent: 14.0,
            market_heat: 60.0,
            price_to_rent: None,
        };
        let mut zero_rent = good.clone();
        zero_rent.median_rent = 0.0;
        let mut missing_cuts = good.clone();
        missing_cuts.price_cuts_percent = f64::NAN;
        let mut cold = good.clone();
        cold.market_heat = -1.0;

        let kept = clean_population(vec![good.clone(), zero_rent, missing_cuts, cold]);
        assert_eq!(kept, vec![good]);
    }
}
