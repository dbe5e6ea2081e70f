//! Trains the classifier and ranker from a metro-level CSV extract.
//!
//! Usage: `train_models <training.csv> [model_dir]`
//!
//! Expected columns: `region_id, region_name, state, median_home_value,
//! median_rent, days_pending, price_cuts_percent, market_heat`. Empty metric
//! cells mark a row as incomplete and drop it.

use anyhow::Context;
use regex::Regex;
use serde::Deserialize;
use std::path::PathBuf;

use zipscore_api::models::RegionMetrics;
use zipscore_api::obs;
use zipscore_api::training::{self, TrainingConfig};

#[derive(Debug, Deserialize)]
struct TrainingRow {
    region_id: String,
    #[serde(default)]
    region_name: String,
    #[serde(default)]
    state: Option<String>,
    median_home_value: Option<f64>,
    median_rent: Option<f64>,
    days_pending: Option<f64>,
    price_cuts_percent: Option<f64>,
    market_heat: Option<f64>,
}

impl TrainingRow {
    /// `None` when any metric is missing.
    fn into_metrics(self, state_suffix: &Regex) -> Option<RegionMetrics> {
        let state = self
            .state
            .filter(|s| !s.trim().is_empty())
            .or_else(|| {
                state_suffix
                    .captures(&self.region_name)
                    .map(|c| c[1].to_string())
            })
            .unwrap_or_default();
        Some(RegionMetrics {
            zip_code: self.region_id.clone(),
            region_id: self.region_id,
            city: String::new(),
            state,
            msa_name: self.region_name,
            median_home_value: self.median_home_value?,
            median_rent: self.median_rent?,
            days_pending: self.days_pending?,
            price_cuts_percent: self.price_cuts_percent?,
            market_heat: self.market_heat?,
            price_to_rent: None,
        })
    }
}

fn main() -> anyhow::Result<()> {
    obs::init_tracing("zipscore_api=info,train_models=info");
    dotenvy::dotenv().ok();

    let mut args = std::env::args().skip(1);
    let input = args
        .next()
        .map(PathBuf::from)
        .context("usage: train_models <training.csv> [model_dir]")?;
    let model_dir = args
        .next()
        .or_else(|| std::env::var("MODEL_DIR").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("model"));

    let state_suffix = Regex::new(r", (\w{2})$")?;
    let mut reader = csv::Reader::from_path(&input)
        .with_context(|| format!("opening {}", input.display()))?;

    let mut incomplete = 0usize;
    let mut records = Vec::new();
    for row in reader.deserialize::<TrainingRow>() {
        let row = row.with_context(|| format!("reading {}", input.display()))?;
        match row.into_metrics(&state_suffix) {
            Some(record) => records.push(record),
            None => incomplete += 1,
        }
    }
    if incomplete > 0 {
        tracing::warn!("Skipped {} rows with missing metrics", incomplete);
    }

    let records = training::clean_population(records);
    let outcome = training::train_and_save(&records, &TrainingConfig::default(), &model_dir)
        .map_err(|e| anyhow::anyhow!(e))?;

    let metrics = outcome.metrics();
    println!("Classification Model Accuracy: {:.2}", metrics.classifier_accuracy);
    println!("Ranking Model R² Score: {:.2}", metrics.ranker_r2);
    println!(
        "Trained on {} rows, evaluated on {}; artifacts in {}",
        metrics.n_train,
        metrics.n_test,
        model_dir.display()
    );
    Ok(())
}
