//! Per-source backlog of formatted lines.

pub mod backlog;

pub use backlog::{BACKLOG_MAX, BacklogBuffer};
