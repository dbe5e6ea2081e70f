//! Composite investment score and good-investment labels.
//!
//! Batch-only: every rank is relative to the population passed in, so the
//! result for one record changes with the population. Never call this at
//! serving time.

use crate::errors::ModelError;
use crate::features;
use crate::models::RegionMetrics;
use crate::weights::ScoreWeights;
use serde::{Deserialize, Serialize};

/// Records at or above this quantile of the composite are labelled good (top 40%).
pub const LABEL_QUANTILE: f64 = 0.6;

/// Below this population size percentile ranks are too coarse to trust.
pub const MIN_STABLE_POPULATION: usize = 200;

/// Percentile rank of each value within `values`, in (0, 100].
///
/// Rank r in [1, N] with ties averaged, scaled as r / N * 100.
/// Returns ranks in the same order as input.
pub fn percentile_rank(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n == 0 {
        return vec![];
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0f64; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // 1-indexed positions i+1..=j+1 share their mean
        let avg_rank = (i + j + 2) as f64 / 2.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg_rank / n as f64 * 100.0;
        }
        i = j + 1;
    }
    ranks
}

/// Quantile with linear interpolation between order statistics.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

pub fn median(values: &[f64]) -> Option<f64> {
    quantile(values, 0.5)
}

/// Goodness-oriented component scores of one record, each in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    pub price_to_rent: f64,
    pub market_heat: f64,
    pub days_pending: f64,
    pub price_cuts: f64,
}

impl ComponentScores {
    pub fn as_array(&self) -> [f64; 4] {
        [
            self.price_to_rent,
            self.market_heat,
            self.days_pending,
            self.price_cuts,
        ]
    }

    pub fn weighted(&self, weights: &ScoreWeights) -> f64 {
        self.as_array()
            .iter()
            .zip(weights.as_array().iter())
            .map(|(c, w)| c * w)
            .sum()
    }
}

/// Scores and labels for a whole training population.
#[derive(Debug, Clone)]
pub struct Composition {
    pub components: Vec<ComponentScores>,
    /// Composite investment score per record, 0-100.
    pub scores: Vec<f64>,
    /// Good-investment label per record.
    pub labels: Vec<bool>,
    /// Composite value at [`LABEL_QUANTILE`].
    pub threshold: f64,
}

impl Composition {
    pub fn positive_rate(&self) -> f64 {
        if self.labels.is_empty() {
            return 0.0;
        }
        self.labels.iter().filter(|&&l| l).count() as f64 / self.labels.len() as f64
    }
}

/// Computes composite scores and labels for `records`.
pub fn compose(records: &[RegionMetrics], weights: &ScoreWeights) -> Result<Composition, ModelError> {
    if records.is_empty() {
        return Err(ModelError::Training(
            "cannot compose scores for an empty population".to_string(),
        ));
    }
    if !weights.validate() {
        return Err(ModelError::Training(format!(
            "score weights must be non-negative and sum to 1.0, got {:?}",
            weights
        )));
    }
    if records.len() < MIN_STABLE_POPULATION {
        tracing::warn!(
            "Composing scores for only {} records; percentile ranks may be unstable",
            records.len()
        );
    }

    let ptr = records
        .iter()
        .map(|r| features::price_to_rent(r.median_home_value, r.median_rent))
        .collect::<Result<Vec<f64>, _>>()?;
    let heat: Vec<f64> = records.iter().map(|r| r.market_heat).collect();
    let days: Vec<f64> = records.iter().map(|r| r.days_pending).collect();
    let cuts: Vec<f64> = records.iter().map(|r| r.price_cuts_percent).collect();

    let ptr_rank = percentile_rank(&ptr);
    let heat_rank = percentile_rank(&heat);
    let days_rank = percentile_rank(&days);
    let cuts_rank = percentile_rank(&cuts);

    let components: Vec<ComponentScores> = (0..records.len())
        .map(|i| ComponentScores {
            price_to_rent: 100.0 - ptr_rank[i],
            market_heat: heat_rank[i],
            days_pending: 100.0 - days_rank[i],
            price_cuts: 100.0 - cuts_rank[i],
        })
        .collect();

    let scores: Vec<f64> = components.iter().map(|c| c.weighted(weights)).collect();
    let threshold = quantile(&scores, LABEL_QUANTILE)
        .ok_or_else(|| ModelError::Training("no scores to threshold".to_string()))?;
    let labels: Vec<bool> = scores.iter().map(|&s| s >= threshold).collect();

    let composition = Composition {
        components,
        scores,
        labels,
        threshold,
    };
    tracing::info!(
        "Composed investment scores for {} records (threshold {:.2}, positive rate {:.2})",
        records.len(),
        composition.threshold,
        composition.positive_rate()
    );
    Ok(composition)
}
