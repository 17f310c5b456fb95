//! Bounded per-source backlog.
//!
//! Every relayed line is appended here whether or not it was also delivered
//! live. A source's queue is created on first append and removed when it is
//! drained by a flush; `peek` replays without consuming.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

/// Default per-source capacity.
pub const BACKLOG_MAX: usize = 64;

/// Shared, bounded, drop-oldest line queues keyed by source channel.
#[derive(Clone)]
pub struct BacklogBuffer {
    queues: Arc<Mutex<HashMap<String, VecDeque<String>>>>,
    capacity: usize,
}

impl BacklogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            queues: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append `line`, evicting the oldest entry when full. Returns whether
    /// an entry was evicted.
    pub async fn append(&self, source: &str, line: String) -> bool {
        let mut queues = self.queues.lock().await;
        let queue = queues
            .entry(source.to_string())
            .or_insert_with(|| VecDeque::with_capacity(self.capacity));

        let evicted = if queue.len() >= self.capacity {
            queue.pop_front().is_some()
        } else {
            false
        };
        queue.push_back(line);

        if evicted {
            debug!(source = %source, capacity = self.capacity, "Backlog full, evicted oldest line");
        }
        evicted
    }

    /// Take every buffered line for `source`, oldest first, and forget the queue.
    pub async fn drain(&self, source: &str) -> Vec<String> {
        self.queues
            .lock()
            .await
            .remove(source)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Copy of the buffered lines for `source`, oldest first.
    pub async fn peek(&self, source: &str) -> Vec<String> {
        self.queues
            .lock()
            .await
            .get(source)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Discard everything buffered for `source`. Returns the number dropped.
    pub async fn clear(&self, source: &str) -> usize {
        self.queues
            .lock()
            .await
            .remove(source)
            .map_or(0, |q| q.len())
    }

    pub async fn len(&self, source: &str) -> usize {
        self.queues.lock().await.get(source).map_or(0, VecDeque::len)
    }

    /// Whether a queue exists for `source` at all.
    pub async fn contains(&self, source: &str) -> bool {
        self.queues.lock().await.contains_key(source)
    }
}

impl Default for BacklogBuffer {
    fn default() -> Self {
        Self::new(BACKLOG_MAX)
    }
}
