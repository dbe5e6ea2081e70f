use crate::artifacts::ModelInfo;
use crate::errors::AppError;
use crate::features::{self, FeatureVector};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

// ============ Stored Records ============

/// Housing-market metrics for one geographic unit.
///
/// At serving time this is one ZIP code; at training time the unit is a metro
/// area and the identity fields may be partially empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionMetrics {
    /// 5-digit, zero-padded ZIP code. Stable storage key.
    #[serde(default)]
    pub zip_code: String,
    /// Provider region identifier of the containing metro area.
    #[serde(default, deserialize_with = "string_or_number")]
    pub region_id: String,
    #[serde(default)]
    pub city: String,
    /// Two-letter state code.
    #[serde(default)]
    pub state: String,
    /// Name of the containing metro area (e.g. "Boston, MA").
    #[serde(default)]
    pub msa_name: String,
    pub median_home_value: f64,
    /// Monthly rent.
    pub median_rent: f64,
    pub days_pending: f64,
    pub price_cuts_percent: f64,
    pub market_heat: f64,
    /// Derived value. Always recomputed from the raw metrics before use.
    #[serde(default)]
    pub price_to_rent: Option<f64>,
}

impl RegionMetrics {
    /// Feature vector in model order, with price-to-rent freshly derived.
    pub fn features(&self) -> Result<FeatureVector, features::FeatureError> {
        features::feature_vector(self)
    }

    /// Checks the raw metric ranges shared by training and serving.
    pub fn validate_metrics(&self) -> Result<(), String> {
        let positive = [
            ("median_home_value", self.median_home_value),
            ("median_rent", self.median_rent),
            ("days_pending", self.days_pending),
            ("market_heat", self.market_heat),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(format!("{} must be positive, got {}", name, value));
            }
        }
        if !self.price_cuts_percent.is_finite() || !(0.0..=100.0).contains(&self.price_cuts_percent)
        {
            return Err(format!(
                "price_cuts_percent must be within 0-100, got {}",
                self.price_cuts_percent
            ));
        }
        Ok(())
    }

    /// Validates a record read from storage and re-derives `price_to_rent`.
    pub fn into_validated(mut self) -> Result<Self, AppError> {
        if !zip_code_regex().is_match(&self.zip_code) {
            return Err(AppError::InvalidRecord(format!(
                "stored zip_code {:?} is not a 5-digit code",
                self.zip_code
            )));
        }
        if !state_code_regex().is_match(&self.state) {
            return Err(AppError::InvalidRecord(format!(
                "zip {}: state {:?} is not a 2-letter code",
                self.zip_code, self.state
            )));
        }
        self.validate_metrics()
            .map_err(|msg| AppError::InvalidRecord(format!("zip {}: {}", self.zip_code, msg)))?;

        let derived =
            features::price_to_rent(self.median_home_value, self.median_rent).map_err(|e| {
                AppError::InvalidRecord(format!("zip {}: {}", self.zip_code, e))
            })?;
        self.price_to_rent = Some(derived);
        Ok(self)
    }
}

fn zip_code_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{5}$").expect("static zip regex"))
}

fn state_code_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z]{2}$").expect("static state regex"))
}

/// Region ids arrive as integers from the provider extracts and as strings
/// from storage.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Int(i) => i.to_string(),
        Raw::Float(f) if f.fract() == 0.0 => format!("{}", f as i64),
        Raw::Float(f) => f.to_string(),
    })
}

// ============ Scoring Results ============

/// Model outputs for one record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelScores {
    /// Positive-class probability from the classifier, in [0, 1].
    pub investment_score: f64,
    /// Regressor output on the composite-score scale.
    pub ranking_score: f64,
}

/// A stored record with its scores attached. Built per request, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(flatten)]
    pub region: RegionMetrics,
    pub investment_score: f64,
    pub ranking_score: f64,
}

/// The six model features of a single ZIP, for display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub median_home_value: f64,
    pub median_rent: f64,
    pub days_pending: f64,
    pub price_cuts_percent: f64,
    pub market_heat: f64,
    pub price_to_rent: f64,
}

impl From<&FeatureVector> for MetricSnapshot {
    fn from(f: &FeatureVector) -> Self {
        Self {
            median_home_value: f[0],
            median_rent: f[1],
            days_pending: f[2],
            price_cuts_percent: f[3],
            market_heat: f[4],
            price_to_rent: f[5],
        }
    }
}

/// Detailed analysis of one stored ZIP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZipAnalysis {
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub msa_name: String,
    pub scores: ModelScores,
    pub metrics: MetricSnapshot,
    /// `<metric>_percentile` -> share of all stored ZIPs with a lower value (0-100).
    pub percentiles: BTreeMap<String, f64>,
    pub nearby_zips: Vec<RegionMetrics>,
    pub model_info: ModelInfo,
}

/// Outcome of a single-ZIP lookup.
#[derive(Debug, Clone)]
pub enum ZipLookup {
    Found(Box<ZipAnalysis>),
    /// The ZIP has no stored data; `nearby` holds the closest stored ZIPs.
    NotFound {
        zip_code: String,
        nearby: Vec<RegionMetrics>,
    },
}

/// Per-metro aggregate for a state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsiSummary {
    /// Region id of the metro area.
    pub msi_name: String,
    pub msa_name: String,
    /// Mean classifier probability over the metro's ZIPs.
    pub investment_score: f64,
    pub price_to_rent_ratio: f64,
    pub market_heat: f64,
    pub days_to_pending: f64,
    pub price_cuts_percent: f64,
    pub zip_count: usize,
}

// ============ API Responses ============

#[derive(Debug, Serialize, Deserialize)]
pub struct RecommendationsResponse {
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MsiResponse {
    pub msi_data: Vec<MsiSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ZipNotFoundResponse {
    pub error: String,
    pub nearby_zips: Vec<RegionMetrics>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> RegionMetrics {
        RegionMetrics {
            zip_code: "02134".to_string(),
            region_id: "394404".to_string(),
            city: "Allston".to_string(),
            state: "MA".to_string(),
            msa_name: "Boston, MA".to_string(),
            median_home_value: 600_000.0,
            median_rent: 2_500.0,
            days_pending: 20.0,
            price_cuts_percent: 10.0,
            market_heat: 70.0,
            price_to_rent: Some(99.0),
        }
    }

    #[test]
    fn test_validation_rederives_price_to_rent() {
        let validated = record().into_validated().unwrap();
        assert_eq!(validated.price_to_rent, Some(600_000.0 / (2_500.0 * 12.0)));
    }

    #[test]
    fn test_validation_rejects_bad_identity() {
        let mut r = record();
        r.zip_code = "2134".to_string();
        assert!(matches!(r.into_validated(), Err(AppError::InvalidRecord(_))));

        let mut r = record();
        r.state = "Mass".to_string();
        assert!(matches!(r.into_validated(), Err(AppError::InvalidRecord(_))));
    }

    #[test]
    fn test_validation_rejects_bad_metrics() {
        let mut r = record();
        r.median_rent = 0.0;
        assert!(r.validate_metrics().is_err());

        let mut r = record();
        r.price_cuts_percent = 120.0;
        assert!(r.validate_metrics().is_err());
    }

    #[test]
    fn test_region_id_accepts_numbers() {
        let json = r#"{"zip_code":"02134","region_id":394404,"city":"Allston","state":"MA",
            "msa_name":"Boston, MA","median_home_value":1.0,"median_rent":1.0,
            "days_pending":1.0,"price_cuts_percent":1.0,"market_heat":1.0}"#;
        let r: RegionMetrics = serde_json::from_str(json).unwrap();
        assert_eq!(r.region_id, "394404");
        assert_eq!(r.price_to_rent, None);
    }

    #[test]
    fn test_recommendation_flattens_region() {
        let rec = Recommendation {
            region: record(),
            investment_score: 0.75,
            ranking_score: 61.0,
        };
        let value = serde_json::to_value(&rec).unwrap();
        assert_eq!(value["zip_code"], "02134");
        assert_eq!(value["ranking_score"], 61.0);
    }
}
