//! Per-feature standardisation: `(x - mean) / scale`.

use crate::errors::ModelError;
use crate::features::{self, FeatureVector, N_FEATURES};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub feature_names: Vec<String>,
    pub mean: Vec<f64>,
    /// Population standard deviation; 1.0 for constant features.
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[FeatureVector]) -> Result<Self, ModelError> {
        if rows.is_empty() {
            return Err(ModelError::Training("cannot fit a scaler on no rows".into()));
        }
        let n = rows.len() as f64;
        let mut mean = vec![0.0; N_FEATURES];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut scale = vec![0.0; N_FEATURES];
        for row in rows {
            for (j, v) in row.iter().enumerate() {
                scale[j] += (v - mean[j]).powi(2);
            }
        }
        for s in scale.iter_mut() {
            let std = (*s / n).sqrt();
            *s = if std > 0.0 && std.is_finite() { std } else { 1.0 };
        }

        Ok(Self {
            feature_names: features::feature_names(),
            mean,
            scale,
        })
    }

    /// A scaler that leaves inputs unchanged.
    pub fn identity() -> Self {
        Self {
            feature_names: features::feature_names(),
            mean: vec![0.0; N_FEATURES],
            scale: vec![1.0; N_FEATURES],
        }
    }

    pub fn transform(&self, row: &FeatureVector) -> FeatureVector {
        let mut out = [0.0; N_FEATURES];
        for (j, v) in row.iter().enumerate() {
            out[j] = (v - self.mean[j]) / self.scale[j];
        }
        out
    }

    pub fn transform_all(&self, rows: &[FeatureVector]) -> Vec<FeatureVector> {
        rows.iter().map(|r| self.transform(r)).collect()
    }

    /// Parses and validates a scaler artifact. `artifact` names it in errors.
    pub fn from_json_str(json: &str, artifact: &str) -> Result<Self, ModelError> {
        let scaler: Self = serde_json::from_str(json).map_err(|source| ModelError::Parse {
            artifact: artifact.to_string(),
            source,
        })?;
        scaler.validate(artifact)?;
        Ok(scaler)
    }

    pub fn to_json_string(&self) -> Result<String, ModelError> {
        serde_json::to_string(self).map_err(|source| ModelError::Parse {
            artifact: "scaler".to_string(),
            source,
        })
    }

    pub fn validate(&self, artifact: &str) -> Result<(), ModelError> {
        let expected = features::feature_names();
        if self.feature_names != expected {
            return Err(ModelError::FeatureMismatch {
                artifact: artifact.to_string(),
                expected,
                actual: self.feature_names.clone(),
            });
        }
        if self.mean.len() != N_FEATURES || self.scale.len() != N_FEATURES {
            return Err(ModelError::InvalidModel(format!(
                "{} must hold {} means and scales",
                artifact, N_FEATURES
            )));
        }
        if self.mean.iter().any(|m| !m.is_finite())
            || self.scale.iter().any(|s| !s.is_finite() || *s <= 0.0)
        {
            return Err(ModelError::InvalidModel(format!(
                "{} has non-finite or non-positive parameters",
                artifact
            )));
        }
        Ok(())
    }
}
