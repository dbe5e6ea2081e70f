//! Replaces the `zip_data` table with a processed per-ZIP CSV.
//!
//! Usage: `import_zip_data <zip_data.csv>`
//!
//! Expected columns: `zip_code, region_id, city, state, msa_name,
//! median_home_value, median_rent, days_pending, price_cuts_percent,
//! market_heat`. ZIP codes are zero-padded and `price_to_rent` is recomputed.

use anyhow::Context;
use serde::Deserialize;
use std::path::PathBuf;

use zipscore_api::db::Database;
use zipscore_api::db_storage::ZipDataStorage;
use zipscore_api::models::RegionMetrics;
use zipscore_api::obs;
use zipscore_api::services::normalize_zip;

#[derive(Debug, Deserialize)]
struct ZipRow {
    zip_code: String,
    #[serde(default)]
    region_id: String,
    #[serde(default)]
    city: String,
    state: String,
    #[serde(default)]
    msa_name: String,
    median_home_value: f64,
    median_rent: f64,
    days_pending: f64,
    price_cuts_percent: f64,
    market_heat: f64,
}

impl From<ZipRow> for RegionMetrics {
    fn from(row: ZipRow) -> Self {
        RegionMetrics {
            zip_code: normalize_zip(&row.zip_code),
            region_id: row.region_id.trim().to_string(),
            city: row.city,
            state: row.state.trim().to_uppercase(),
            msa_name: row.msa_name,
            median_home_value: row.median_home_value,
            median_rent: row.median_rent,
            days_pending: row.days_pending,
            price_cuts_percent: row.price_cuts_percent,
            market_heat: row.market_heat,
            price_to_rent: None,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    obs::init_tracing("zipscore_api=info,import_zip_data=info");
    dotenvy::dotenv().ok();

    let input = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: import_zip_data <zip_data.csv>")?;
    let database_url = std::env::var("DB_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .context("DB_URL or DATABASE_URL must be set")?;

    let mut reader = csv::Reader::from_path(&input)
        .with_context(|| format!("opening {}", input.display()))?;

    let mut records = Vec::new();
    let mut rejected = 0usize;
    for (line, row) in reader.deserialize::<ZipRow>().enumerate() {
        let row = row.with_context(|| format!("reading {} row {}", input.display(), line + 1))?;
        match RegionMetrics::from(row).into_validated() {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!("Skipping row {}: {}", line + 1, e);
                rejected += 1;
            }
        }
    }
    println!(
        "Validated {} ZIP records ({} rejected)",
        records.len(),
        rejected
    );

    let db = Database::new(&database_url).await?;
    db.ensure_schema().await?;
    let storage = ZipDataStorage::new(db.pool.clone());
    let inserted = storage
        .replace_all(&records)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    println!("✓ Imported {} ZIP records into zip_data", inserted);
    Ok(())
}
