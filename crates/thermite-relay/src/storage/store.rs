//! The pipe table as the relay engine sees it.

use async_trait::async_trait;
use tracing::warn;

use super::db::RelayDatabase;
use thermite_core::db::DatabaseError;

/// Pipe store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl From<DatabaseError> for StoreError {
    fn from(e: DatabaseError) -> Self {
        warn!(error = %e, "Pipe store operation failed");
        Self::Unavailable(e.to_string())
    }
}

/// Durable `(source, target, reason)` table.
#[async_trait]
pub trait PipeStore: Send + Sync {
    async fn add(&self, source: &str, target: &str, reason: &str) -> Result<(), StoreError>;

    async fn remove(&self, source: &str) -> Result<(), StoreError>;

    /// Every stored `(source, target)` pair, ordered by source.
    async fn list(&self) -> Result<Vec<(String, String)>, StoreError>;
}

#[async_trait]
impl PipeStore for RelayDatabase {
    async fn add(&self, source: &str, target: &str, reason: &str) -> Result<(), StoreError> {
        self.add_pipe(source, target, reason).await?;
        Ok(())
    }

    async fn remove(&self, source: &str) -> Result<(), StoreError> {
        self.remove_pipe(source).await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<(String, String)>, StoreError> {
        Ok(self
            .list_pipes()
            .await?
            .into_iter()
            .map(|p| (p.source, p.target))
            .collect())
    }
}
