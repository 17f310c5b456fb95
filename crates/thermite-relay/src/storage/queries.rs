//! Database queries for the pipe table.

use thermite_core::db::{DatabaseError, unix_timestamp};

use super::db::RelayDatabase;
use super::models::PipeRecord;

impl RelayDatabase {
    // =========================================================================
    // Pipe queries
    // =========================================================================

    /// Insert a pipe. Fails if either the source or the target is taken.
    pub async fn add_pipe(
        &self,
        source: &str,
        target: &str,
        reason: &str,
    ) -> Result<PipeRecord, DatabaseError> {
        let now = unix_timestamp();

        sqlx::query("INSERT INTO pipes (source, target, reason, created_at) VALUES (?, ?, ?, ?)")
            .bind(source)
            .bind(target)
            .bind(reason)
            .bind(now)
            .execute(self.pool())
            .await?;

        self.get_pipe(source)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Pipe {source}")))
    }

    /// Get a pipe by source channel.
    pub async fn get_pipe(&self, source: &str) -> Result<Option<PipeRecord>, DatabaseError> {
        Ok(
            sqlx::query_as::<_, PipeRecord>("SELECT * FROM pipes WHERE source = ?")
                .bind(source)
                .fetch_optional(self.pool())
                .await?,
        )
    }

    /// Delete a pipe. Returns whether a row was removed.
    pub async fn remove_pipe(&self, source: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM pipes WHERE source = ?")
            .bind(source)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// All pipes, ordered by source.
    pub async fn list_pipes(&self) -> Result<Vec<PipeRecord>, DatabaseError> {
        Ok(
            sqlx::query_as::<_, PipeRecord>("SELECT * FROM pipes ORDER BY source")
                .fetch_all(self.pool())
                .await?,
        )
    }
}
