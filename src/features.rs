//! Feature derivation shared by training and serving.
//!
//! Both pipelines build their model inputs through [`feature_vector`], so
//! price-to-rent is computed by exactly one function.

use crate::models::RegionMetrics;
use thiserror::Error;

/// Number of model features.
pub const N_FEATURES: usize = 6;

/// Feature order expected by every fitted artifact.
pub const FEATURE_NAMES: [&str; N_FEATURES] = [
    "median_home_value",
    "median_rent",
    "days_pending",
    "price_cuts_percent",
    "market_heat",
    "price_to_rent",
];

pub type FeatureVector = [f64; N_FEATURES];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureError {
    #[error("median_rent must be positive, got {0}")]
    NonPositiveRent(f64),

    #[error("{0} must be a finite number")]
    NonFinite(&'static str),
}

/// Home value over annualized rent.
pub fn price_to_rent(median_home_value: f64, median_rent: f64) -> Result<f64, FeatureError> {
    if !median_home_value.is_finite() {
        return Err(FeatureError::NonFinite("median_home_value"));
    }
    if !median_rent.is_finite() {
        return Err(FeatureError::NonFinite("median_rent"));
    }
    if median_rent <= 0.0 {
        return Err(FeatureError::NonPositiveRent(median_rent));
    }
    Ok(median_home_value / (median_rent * 12.0))
}

/// Builds the model input for one record. Any stored `price_to_rent` is
/// ignored in favour of a fresh derivation.
pub fn feature_vector(record: &RegionMetrics) -> Result<FeatureVector, FeatureError> {
    let raw = [
        ("days_pending", record.days_pending),
        ("price_cuts_percent", record.price_cuts_percent),
        ("market_heat", record.market_heat),
    ];
    for (name, value) in raw {
        if !value.is_finite() {
            return Err(FeatureError::NonFinite(name));
        }
    }

    let ptr = price_to_rent(record.median_home_value, record.median_rent)?;
    Ok([
        record.median_home_value,
        record.median_rent,
        record.days_pending,
        record.price_cuts_percent,
        record.market_heat,
        ptr,
    ])
}

/// Feature names as owned strings, for artifact metadata.
pub fn feature_names() -> Vec<String> {
    FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_to_rent() {
        let ptr = price_to_rent(360_000.0, 1_500.0).unwrap();
        assert_eq!(ptr, 20.0);
    }

    #[test]
    fn test_non_positive_rent_rejected() {
        assert_eq!(
            price_to_rent(300_000.0, 0.0),
            Err(FeatureError::NonPositiveRent(0.0))
        );
        assert!(price_to_rent(300_000.0, -10.0).is_err());
    }

    #[test]
    fn test_non_finite_rejected() {
        assert_eq!(
            price_to_rent(f64::NAN, 1_000.0),
            Err(FeatureError::NonFinite("median_home_value"))
        );
    }

    #[test]
    fn test_feature_vector_ignores_stored_ratio() {
        let record = RegionMetrics {
            zip_code: "10001".to_string(),
            region_id: "394913".to_string(),
            city: "New York".to_string(),
            state: "NY".to_string(),
            msa_name: "New York, NY".to_string(),
            median_home_value: 720_000.0,
            median_rent: 3_000.0,
            days_pending: 30.0,
            price_cuts_percent: 12.5,
            market_heat: 55.0,
            price_to_rent: Some(19.99),
        };
        let f = feature_vector(&record).unwrap();
        assert_eq!(f[5], 20.0);
        assert_eq!(f[0], 720_000.0);
        assert_eq!(f[4], 55.0);
    }
}
