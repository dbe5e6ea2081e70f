use crate::artifacts::ModelBundle;
use crate::errors::{AppError, ResultExt};
use crate::features::{FeatureVector, FEATURE_NAMES};
use crate::models::{
    MetricSnapshot, MsiSummary, Recommendation, RegionMetrics, ZipAnalysis, ZipLookup,
};
use crate::proximity::{self, DEFAULT_NEARBY_COUNT};
use crate::store::MetricStore;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Applies the fitted model pair to stored records.
///
/// Holds no state between calls; every operation reads the store and scores
/// inline.
pub struct ScoringService<'a> {
    bundle: &'a ModelBundle,
    store: &'a dyn MetricStore,
    nearby_zip_count: usize,
}

impl<'a> ScoringService<'a> {
    pub fn new(bundle: &'a ModelBundle, store: &'a dyn MetricStore) -> Self {
        Self {
            bundle,
            store,
            nearby_zip_count: DEFAULT_NEARBY_COUNT,
        }
    }

    pub fn with_nearby_count(mut self, k: usize) -> Self {
        self.nearby_zip_count = k;
        self
    }

    /// Scores each record, keeping input order.
    pub fn score_records(&self, records: Vec<RegionMetrics>) -> Result<Vec<Recommendation>, AppError> {
        records
            .into_iter()
            .map(|region| -> Result<Recommendation, AppError> {
                let features = region.features()?;
                let scores = self.bundle.score(&features);
                Ok(Recommendation {
                    region,
                    investment_score: scores.investment_score,
                    ranking_score: scores.ranking_score,
                })
            })
            .collect()
    }

    /// Every ZIP of `state`, best `ranking_score` first. Ties keep storage order.
    pub async fn score_state(&self, state: &str) -> Result<Vec<Recommendation>, AppError> {
        let state = state.to_uppercase();
        let records = self.store.get_state_data(&state).await?;
        let mut recommendations = self
            .score_records(records)
            .with_context(|| format!("scoring state {}", state))?;
        recommendations.sort_by(|a, b| b.ranking_score.total_cmp(&a.ranking_score));
        tracing::debug!("Scored {} ZIPs for state {}", recommendations.len(), state);
        Ok(recommendations)
    }

    /// Analysis of one ZIP, or the nearest stored ZIPs when it has no data.
    pub async fn score_zip(&self, zip_code: &str) -> Result<ZipLookup, AppError> {
        let zip_code = normalize_zip(zip_code);
        let record = self.store.get_zip_info(&zip_code).await?;
        let corpus = self.store.get_zip_data().await?;

        let known: Vec<&str> = corpus.iter().map(|r| r.zip_code.as_str()).collect();
        let nearby: Vec<RegionMetrics> =
            proximity::find_nearby_zips(&zip_code, &known, self.nearby_zip_count)
                .iter()
                .filter_map(|zip| corpus.iter().find(|r| &r.zip_code == zip).cloned())
                .collect();

        let Some(record) = record else {
            tracing::debug!(
                "ZIP {} not stored; suggesting {} nearby ZIPs",
                zip_code,
                nearby.len()
            );
            return Ok(ZipLookup::NotFound { zip_code, nearby });
        };

        let features = record.features()?;
        let scores = self.bundle.score(&features);
        let corpus_features = corpus
            .iter()
            .map(RegionMetrics::features)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ZipLookup::Found(Box::new(ZipAnalysis {
            city: record.city.clone(),
            state: record.state.clone(),
            zip_code: record.zip_code.clone(),
            msa_name: record.msa_name.clone(),
            scores,
            metrics: MetricSnapshot::from(&features),
            percentiles: metric_percentiles(&features, &corpus_features),
            nearby_zips: nearby,
            model_info: self.bundle.info().clone(),
        })))
    }

    /// Classifier scores of a state's ZIPs, averaged per metro area.
    pub async fn score_msi(&self, state: &str) -> Result<Vec<MsiSummary>, AppError> {
        let state = state.to_uppercase();
        let records = self.store.get_state_data(&state).await?;

        struct Group {
            first: RegionMetrics,
            price_to_rent: f64,
            score_sum: f64,
            count: usize,
        }
        let mut groups: BTreeMap<RegionKey, Group> = BTreeMap::new();
        for record in records {
            let features = record.features()?;
            let score = self.bundle.investment_score(&features);
            groups
                .entry(RegionKey::new(&record.region_id))
                .and_modify(|g| {
                    g.score_sum += score;
                    g.count += 1;
                })
                .or_insert(Group {
                    price_to_rent: features[5],
                    first: record,
                    score_sum: score,
                    count: 1,
                });
        }

        Ok(groups
            .into_values()
            .map(|g| MsiSummary {
                msi_name: g.first.region_id,
                msa_name: g.first.msa_name,
                investment_score: g.score_sum / g.count as f64,
                price_to_rent_ratio: g.price_to_rent,
                market_heat: g.first.market_heat,
                days_to_pending: g.first.days_pending,
                price_cuts_percent: g.first.price_cuts_percent,
                zip_count: g.count,
            })
            .collect())
    }
}

/// Left-pads a ZIP with zeros to five characters.
pub fn normalize_zip(zip_code: &str) -> String {
    format!("{:0>5}", zip_code.trim())
}

/// Share of `corpus` strictly below `value`, as a percentage.
pub fn percentile_of(value: f64, corpus: &[f64]) -> f64 {
    if corpus.is_empty() {
        return 0.0;
    }
    let below = corpus.iter().filter(|&&v| v < value).count();
    below as f64 / corpus.len() as f64 * 100.0
}

fn metric_percentiles(features: &FeatureVector, corpus: &[FeatureVector]) -> BTreeMap<String, f64> {
    FEATURE_NAMES
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let column: Vec<f64> = corpus.iter().map(|f| f[j]).collect();
            (format!("{}_percentile", name), percentile_of(features[j], &column))
        })
        .collect()
}

/// Orders numeric region ids numerically, ahead of all other ids.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RegionKey {
    Numeric(u64, String),
    Text(String),
}

impl RegionKey {
    fn new(id: &str) -> Self {
        match id.parse::<u64>() {
            Ok(n) => RegionKey::Numeric(n, id.to_string()),
            Err(_) => RegionKey::Text(id.to_string()),
        }
    }
}

impl PartialOrd for RegionKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RegionKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (RegionKey::Numeric(a, sa), RegionKey::Numeric(b, sb)) => a.cmp(b).then_with(|| sa.cmp(sb)),
            (RegionKey::Numeric(..), RegionKey::Text(_)) => Ordering::Less,
            (RegionKey::Text(_), RegionKey::Numeric(..)) => Ordering::Greater,
            (RegionKey::Text(a), RegionKey::Text(b)) => a.cmp(b),
        }
    }
}
