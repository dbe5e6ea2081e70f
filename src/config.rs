use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Postgres URL. When absent, records are served from `zip_data_file`.
    pub database_url: Option<String>,
    /// JSON array of ZIP records.
    pub zip_data_file: Option<PathBuf>,
    pub port: u16,
    pub model_dir: PathBuf,
    pub nearby_zip_count: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .ok()
                .map(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DB_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })
                .transpose()?,
            zip_data_file: std::env::var("ZIP_DATA_FILE")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            model_dir: std::env::var("MODEL_DIR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("model")),
            nearby_zip_count: std::env::var("NEARBY_ZIP_COUNT")
                .unwrap_or_else(|_| "3".to_string())
                .parse::<usize>()
                .map_err(|_| anyhow::anyhow!("NEARBY_ZIP_COUNT must be a positive integer"))
                .and_then(|k| {
                    if k == 0 {
                        anyhow::bail!("NEARBY_ZIP_COUNT must be at least 1");
                    }
                    Ok(k)
                })?,
        };

        if config.database_url.is_none() && config.zip_data_file.is_none() {
            anyhow::bail!("Set DB_URL/DATABASE_URL or ZIP_DATA_FILE to provide ZIP data");
        }

        tracing::info!("Configuration loaded successfully");
        if let Some(ref url) = config.database_url {
            tracing::debug!("Database URL: {}...", url.chars().take(20).collect::<String>());
        }
        if let Some(ref path) = config.zip_data_file {
            tracing::debug!("ZIP data file: {}", path.display());
        }
        tracing::debug!("Model directory: {}", config.model_dir.display());
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}
