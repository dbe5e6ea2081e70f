use sqlx::{postgres::PgPoolOptions, PgPool};

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;

        Ok(Self { pool })
    }

    /// Creates the `zip_data` table if it does not exist.
    ///
    /// `seq` records insertion order, which is the storage order state queries return.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS zip_data (
                seq BIGSERIAL PRIMARY KEY,
                zip_code TEXT NOT NULL UNIQUE,
                region_id TEXT NOT NULL DEFAULT '',
                city TEXT NOT NULL DEFAULT '',
                state TEXT NOT NULL,
                msa_name TEXT NOT NULL DEFAULT '',
                median_home_value DOUBLE PRECISION NOT NULL,
                median_rent DOUBLE PRECISION NOT NULL,
                days_pending DOUBLE PRECISION NOT NULL,
                price_cuts_percent DOUBLE PRECISION NOT NULL,
                market_heat DOUBLE PRECISION NOT NULL,
                price_to_rent DOUBLE PRECISION,
                imported_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS zip_data_state_idx ON zip_data (state)")
            .execute(&self.pool)
            .await?;

        tracing::info!("zip_data schema ready");
        Ok(())
    }
}
