//! thermite relay library
//!
//! Pipes the activity of monitored IRC channels ("sources") into per-source
//! target channels:
//! - IRC client plumbing (framing, state tracking, TLS, reconnection)
//! - Pipe registry backed by `SQLite`
//! - Presence-aware bounded backlog, flushed when a reader joins
//! - In-channel command language for managing pipes

pub mod buffer;
pub mod commands;
pub mod irc;
pub mod registry;
pub mod relay;
pub mod storage;
pub mod transport;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test_helpers;
