use crate::errors::{AppError, ResultExt};
use crate::models::RegionMetrics;
use crate::store::MetricStore;
use async_trait::async_trait;
use sqlx::PgPool;

const SELECT_COLUMNS: &str = "zip_code, region_id, city, state, msa_name, median_home_value, \
     median_rent, days_pending, price_cuts_percent, market_heat, price_to_rent";

#[derive(Debug, sqlx::FromRow)]
struct ZipDataRow {
    zip_code: String,
    region_id: String,
    city: String,
    state: String,
    msa_name: String,
    median_home_value: f64,
    median_rent: f64,
    days_pending: f64,
    price_cuts_percent: f64,
    market_heat: f64,
    price_to_rent: Option<f64>,
}

impl ZipDataRow {
    fn into_validated(self) -> Result<RegionMetrics, AppError> {
        RegionMetrics {
            zip_code: self.zip_code,
            region_id: self.region_id,
            city: self.city,
            state: self.state,
            msa_name: self.msa_name,
            median_home_value: self.median_home_value,
            median_rent: self.median_rent,
            days_pending: self.days_pending,
            price_cuts_percent: self.price_cuts_percent,
            market_heat: self.market_heat,
            price_to_rent: self.price_to_rent,
        }
        .into_validated()
    }
}

fn validate_rows(rows: Vec<ZipDataRow>) -> Result<Vec<RegionMetrics>, AppError> {
    rows.into_iter().map(ZipDataRow::into_validated).collect()
}

/// Postgres storage for per-ZIP market metrics (`zip_data` table).
pub struct ZipDataStorage {
    pool: PgPool,
}

impl ZipDataStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Replaces the whole table with `records` in one transaction. Returns the row count.
    pub async fn replace_all(&self, records: &[RegionMetrics]) -> Result<u64, AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("starting zip_data import")?;

        sqlx::query("DELETE FROM zip_data")
            .execute(&mut *tx)
            .await
            .context("clearing zip_data")?;

        let mut inserted = 0u64;
        for record in records {
            let result = sqlx::query(
                r#"
                INSERT INTO zip_data (
                    zip_code, region_id, city, state, msa_name, median_home_value,
                    median_rent, days_pending, price_cuts_percent, market_heat, price_to_rent
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(&record.zip_code)
            .bind(&record.region_id)
            .bind(&record.city)
            .bind(&record.state)
            .bind(&record.msa_name)
            .bind(record.median_home_value)
            .bind(record.median_rent)
            .bind(record.days_pending)
            .bind(record.price_cuts_percent)
            .bind(record.market_heat)
            .bind(record.price_to_rent)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("inserting zip {}", record.zip_code))?;
            inserted += result.rows_affected();
        }

        tx.commit().await.context("committing zip_data import")?;
        tracing::info!("Imported {} ZIP records", inserted);
        Ok(inserted)
    }
}

#[async_trait]
impl MetricStore for ZipDataStorage {
    async fn get_state_data(&self, state: &str) -> Result<Vec<RegionMetrics>, AppError> {
        let rows: Vec<ZipDataRow> = sqlx::query_as(&format!(
            "SELECT {} FROM zip_data WHERE state = $1 ORDER BY seq",
            SELECT_COLUMNS
        ))
        .bind(state)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("loading zip data for state {}", state))?;

        validate_rows(rows)
    }

    async fn get_zip_info(&self, zip_code: &str) -> Result<Option<RegionMetrics>, AppError> {
        let row: Option<ZipDataRow> = sqlx::query_as(&format!(
            "SELECT {} FROM zip_data WHERE zip_code = $1",
            SELECT_COLUMNS
        ))
        .bind(zip_code)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("loading zip {}", zip_code))?;

        row.map(ZipDataRow::into_validated).transpose()
    }

    async fn get_zip_data(&self) -> Result<Vec<RegionMetrics>, AppError> {
        let rows: Vec<ZipDataRow> = sqlx::query_as(&format!(
            "SELECT {} FROM zip_data ORDER BY seq",
            SELECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .context("loading all zip data")?;

        validate_rows(rows)
    }
}
