//! Holdout evaluation of a trained bundle.

use crate::artifacts::{self, ModelBundle, EVALUATION_FILE, RESULTS_DIR};
use crate::composer;
use crate::errors::ModelError;
use crate::training::HoldoutSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const EVALUATION_ROWS_FILE: &str = "evaluation_results.csv";

/// Binary confusion matrix, positive class = good investment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_negative: usize,
    pub false_positive: usize,
    pub false_negative: usize,
    pub true_positive: usize,
}

impl ConfusionMatrix {
    pub fn from_labels(truth: &[bool], predicted: &[bool]) -> Self {
        let mut cm = Self::default();
        for (&t, &p) in truth.iter().zip(predicted) {
            match (t, p) {
                (false, false) => cm.true_negative += 1,
                (false, true) => cm.false_positive += 1,
                (true, false) => cm.false_negative += 1,
                (true, true) => cm.true_positive += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> usize {
        self.true_negative + self.false_positive + self.false_negative + self.true_positive
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_negative + self.true_positive, self.total())
    }

    /// Metrics for the positive (`true`) or negative (`false`) class.
    pub fn class_metrics(&self, positive: bool) -> ClassMetrics {
        let (tp, fp, fn_) = if positive {
            (self.true_positive, self.false_positive, self.false_negative)
        } else {
            (self.true_negative, self.false_negative, self.false_positive)
        };
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        ClassMetrics {
            label: positive,
            precision,
            recall,
            f1,
            support: tp + fn_,
        }
    }
}

/// Zero when the denominator is zero.
fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub label: bool,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// One holdout row, as written to the CSV export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRow {
    pub zip_code: String,
    pub true_label: bool,
    pub predicted_label: bool,
    pub confidence_score: f64,
    pub predicted_investment_score: f64,
    pub true_investment_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub run_id: Uuid,
    pub evaluated_at: DateTime<Utc>,
    pub n_samples: usize,
    pub accuracy: f64,
    pub confusion_matrix: ConfusionMatrix,
    /// Negative class first.
    pub classes: Vec<ClassMetrics>,
    pub confidence_mean: f64,
    pub confidence_median: f64,
    pub predicted_score_mean: f64,
    pub true_score_mean: f64,
    /// Pearson correlation of predicted and true composite scores; absent when undefined.
    pub score_correlation: Option<f64>,
    /// Classifier importances, largest first.
    pub feature_importances: Vec<FeatureImportance>,
}

/// Pearson correlation coefficient. `None` for fewer than two points or zero variance.
pub fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < 2 {
        return None;
    }
    let mean_a = a[..n].iter().sum::<f64>() / n as f64;
    let mean_b = b[..n].iter().sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a[..n].iter().zip(&b[..n]) {
        cov += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
    }
    if var_a == 0.0 || var_b == 0.0 {
        return None;
    }
    Some(cov / (var_a.sqrt() * var_b.sqrt()))
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Scores `holdout` through both pipelines of `bundle`.
pub fn evaluate(
    bundle: &ModelBundle,
    holdout: &HoldoutSet,
) -> Result<(EvaluationReport, Vec<EvaluationRow>), ModelError> {
    if holdout.is_empty() {
        return Err(ModelError::InvalidModel("holdout set is empty".into()));
    }

    let rows: Vec<EvaluationRow> = holdout
        .features
        .iter()
        .enumerate()
        .map(|(i, f)| {
            let p1 = bundle.investment_score(f);
            EvaluationRow {
                zip_code: holdout.zip_codes[i].clone(),
                true_label: holdout.labels[i],
                predicted_label: p1 > 0.5,
                confidence_score: p1.max(1.0 - p1),
                predicted_investment_score: bundle.ranking_score(f),
                true_investment_score: holdout.scores[i],
            }
        })
        .collect();

    let predicted: Vec<bool> = rows.iter().map(|r| r.predicted_label).collect();
    let confusion = ConfusionMatrix::from_labels(&holdout.labels, &predicted);
    let confidence: Vec<f64> = rows.iter().map(|r| r.confidence_score).collect();
    let predicted_scores: Vec<f64> = rows.iter().map(|r| r.predicted_investment_score).collect();

    let classifier = bundle.classifier();
    let mut importances: Vec<FeatureImportance> = classifier
        .feature_names()
        .iter()
        .zip(classifier.feature_importances())
        .map(|(feature, &importance)| FeatureImportance {
            feature: feature.clone(),
            importance,
        })
        .collect();
    importances.sort_by(|a, b| b.importance.total_cmp(&a.importance));

    let report = EvaluationReport {
        run_id: bundle.info().run_id,
        evaluated_at: Utc::now(),
        n_samples: rows.len(),
        accuracy: confusion.accuracy(),
        confusion_matrix: confusion,
        classes: vec![confusion.class_metrics(false), confusion.class_metrics(true)],
        confidence_mean: mean(&confidence),
        confidence_median: composer::median(&confidence).unwrap_or(0.0),
        predicted_score_mean: mean(&predicted_scores),
        true_score_mean: mean(&holdout.scores),
        score_correlation: pearson(&predicted_scores, &holdout.scores),
        feature_importances: importances,
    };
    tracing::info!(
        "Evaluated {} holdout rows: accuracy {:.2}, mean confidence {:.2}",
        report.n_samples,
        report.accuracy,
        report.confidence_mean
    );
    Ok((report, rows))
}

pub fn results_dir(model_dir: impl AsRef<Path>) -> PathBuf {
    model_dir.as_ref().join(RESULTS_DIR)
}

/// Writes `results/evaluation.json` and `results/evaluation_results.csv` under `model_dir`.
pub fn save_report(
    report: &EvaluationReport,
    rows: &[EvaluationRow],
    model_dir: impl AsRef<Path>,
) -> Result<(), ModelError> {
    let dir = results_dir(model_dir);
    artifacts::ensure_dir(&dir)?;

    let json = serde_json::to_string_pretty(report).map_err(|source| ModelError::Parse {
        artifact: EVALUATION_FILE.to_string(),
        source,
    })?;
    artifacts::write_file(dir.join(EVALUATION_FILE), json.as_bytes())?;

    let csv_path = dir.join(EVALUATION_ROWS_FILE);
    let csv_err = |e: csv::Error| ModelError::Io {
        path: csv_path.clone(),
        source: std::io::Error::from(e),
    };
    let mut writer = csv::Writer::from_path(&csv_path).map_err(csv_err)?;
    for row in rows {
        writer.serialize(row).map_err(csv_err)?;
    }
    writer.flush().map_err(|source| ModelError::Io {
        path: csv_path.clone(),
        source,
    })?;
    Ok(())
}

pub fn load_report(model_dir: impl AsRef<Path>) -> Result<EvaluationReport, ModelError> {
    let path = results_dir(model_dir).join(EVALUATION_FILE);
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ModelError::MissingArtifact { path });
        }
        Err(source) => return Err(ModelError::Io { path, source }),
    };
    serde_json::from_slice(&bytes).map_err(|source| ModelError::Parse {
        artifact: EVALUATION_FILE.to_string(),
        source,
    })
}
