//! Data models for pipe storage.

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PipeRecord {
    pub source: String,
    pub target: String,
    pub reason: String,
    pub created_at: i64,
}
