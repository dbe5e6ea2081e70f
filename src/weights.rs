//! Weights of the composite investment score.

use serde::{Deserialize, Serialize};

/// Policy weights for the four score components. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    /// Price-to-rent ratio (lower is better)
    pub price_to_rent: f64,
    /// Market heat index (higher is better)
    pub market_heat: f64,
    /// Days to pending (lower is better)
    pub days_pending: f64,
    /// Share of listings with a price cut (lower is better)
    pub price_cuts: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            price_to_rent: 0.40,
            market_heat: 0.30,
            days_pending: 0.15,
            price_cuts: 0.15,
        }
    }
}

impl ScoreWeights {
    fn sum(&self) -> f64 {
        self.price_to_rent + self.market_heat + self.days_pending + self.price_cuts
    }

    /// Validate that all weights are non-negative and sum to ~1.0
    pub fn validate(&self) -> bool {
        self.as_array().iter().all(|w| w.is_finite() && *w >= 0.0)
            && (self.sum() - 1.0).abs() < 1e-6
    }

    /// Renormalise weights so they sum to 1.0
    pub fn normalise(&mut self) {
        let sum = self.sum();
        if sum > 0.0 {
            self.price_to_rent /= sum;
            self.market_heat /= sum;
            self.days_pending /= sum;
            self.price_cuts /= sum;
        }
    }

    /// Order: price_to_rent, market_heat, days_pending, price_cuts.
    pub fn as_array(&self) -> [f64; 4] {
        [
            self.price_to_rent,
            self.market_heat,
            self.days_pending,
            self.price_cuts,
        ]
    }
}
