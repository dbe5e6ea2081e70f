//! Read-side storage contract for region metric records.

use crate::errors::{AppError, ResultExt};
use crate::models::RegionMetrics;
use async_trait::async_trait;
use std::path::Path;

/// Source of stored ZIP records. Every returned record has passed
/// [`RegionMetrics::into_validated`].
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// All records of one state, in storage order.
    async fn get_state_data(&self, state: &str) -> Result<Vec<RegionMetrics>, AppError>;

    async fn get_zip_info(&self, zip_code: &str) -> Result<Option<RegionMetrics>, AppError>;

    /// Every stored record, in storage order.
    async fn get_zip_data(&self) -> Result<Vec<RegionMetrics>, AppError>;
}

/// Store backed by a fixed list of records. Used for file-backed serving and tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    records: Vec<RegionMetrics>,
}

impl InMemoryStore {
    /// Validates every record up front; list order becomes storage order.
    pub fn new(records: Vec<RegionMetrics>) -> Result<Self, AppError> {
        let records = records
            .into_iter()
            .map(RegionMetrics::into_validated)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { records })
    }

    /// Loads a JSON array of records.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .map_err(|e| AppError::InternalError(e.to_string()))
            .with_context(|| format!("reading {}", path.display()))?;
        let records: Vec<RegionMetrics> = serde_json::from_str(&data)
            .map_err(|e| AppError::InvalidRecord(e.to_string()))
            .with_context(|| format!("parsing {}", path.display()))?;
        let store = Self::new(records)?;
        tracing::info!(
            "Loaded {} ZIP records from {}",
            store.records.len(),
            path.display()
        );
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl MetricStore for InMemoryStore {
    async fn get_state_data(&self, state: &str) -> Result<Vec<RegionMetrics>, AppError> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.state == state)
            .cloned()
            .collect())
    }

    async fn get_zip_info(&self, zip_code: &str) -> Result<Option<RegionMetrics>, AppError> {
        Ok(self.records.iter().find(|r| r.zip_code == zip_code).cloned())
    }

    async fn get_zip_data(&self) -> Result<Vec<RegionMetrics>, AppError> {
        Ok(self.records.clone())
    }
}
