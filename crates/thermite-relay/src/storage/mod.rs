//! `SQLite` storage for the pipe table.
//!
//! The table is the source of truth for which pipes exist; the in-memory
//! registry is rebuilt from it on every (re)connect.

mod db;
mod models;
mod queries;
mod store;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests;

pub use db::RelayDatabase;
pub use models::PipeRecord;
pub use store::{PipeStore, StoreError};
pub use thermite_core::db::DatabaseError;
