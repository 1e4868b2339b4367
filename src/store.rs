use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::models::{Field, Prospect};

/// Read side of a prospect store.
#[async_trait]
pub trait RecordSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// The whole collection, newest first.
    async fn fetch_all(&self) -> Result<Vec<Prospect>, StoreError>;
}

/// A store the controller mirrors writes into.
#[async_trait]
pub trait RecordStore: RecordSource {
    async fn insert(&self, prospect: &Prospect) -> Result<(), StoreError>;

    /// Writes the `changed` fields of `prospect`, matched by id.
    async fn update(&self, prospect: &Prospect, changed: &[Field]) -> Result<(), StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}

/// Reads from `primary` when there is one and it answers, otherwise from `fallback`.
pub struct FallbackStore {
    primary: Option<Arc<dyn RecordStore>>,
    fallback: Arc<dyn RecordSource>,
}

impl FallbackStore {
    pub fn new(primary: Option<Arc<dyn RecordStore>>, fallback: Arc<dyn RecordSource>) -> Self {
        Self { primary, fallback }
    }

    /// Fetches the collection and reports which store supplied it.
    pub async fn fetch_with_source(&self) -> Result<(Vec<Prospect>, &'static str), StoreError> {
        if let Some(primary) = &self.primary {
            match primary.fetch_all().await {
                Ok(records) => {
                    info!("Loaded {} prospects from {}", records.len(), primary.name());
                    return Ok((records, primary.name()));
                }
                Err(err) => {
                    warn!(
                        "Failed to load from {}, falling back to {}: {}",
                        primary.name(),
                        self.fallback.name(),
                        err
                    );
                }
            }
        }

        let records = self.fallback.fetch_all().await?;
        info!("Loaded {} prospects from {}", records.len(), self.fallback.name());
        Ok((records, self.fallback.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{prospect, MemoryStore};

    #[tokio::test]
    async fn prefers_primary_when_it_answers() {
        let primary = Arc::new(MemoryStore::with_records(vec![prospect("remote", "Remote Co")]));
        let fallback = Arc::new(MemoryStore::with_records(vec![prospect("local", "Local Co")]));
        let store = FallbackStore::new(Some(primary), fallback);

        let (records, source) = store.fetch_with_source().await.unwrap();
        assert_eq!(source, "memory");
        assert_eq!(records[0].id, "remote");
    }

    #[tokio::test]
    async fn falls_back_when_primary_fails() {
        let primary = Arc::new(MemoryStore::with_records(vec![prospect("remote", "Remote Co")]));
        primary.set_failing(true);
        let fallback = Arc::new(MemoryStore::with_records(vec![prospect("local", "Local Co")]));
        let store = FallbackStore::new(Some(primary), fallback);

        let (records, source) = store.fetch_with_source().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "local");
        assert_eq!(source, "memory");
    }

    #[tokio::test]
    async fn absent_primary_reads_the_fallback() {
        let fallback = Arc::new(MemoryStore::with_records(vec![prospect("local", "Local Co")]));
        let store = FallbackStore::new(None, fallback);

        let (records, _) = store.fetch_with_source().await.unwrap();
        assert_eq!(records[0].id, "local");
    }
}
