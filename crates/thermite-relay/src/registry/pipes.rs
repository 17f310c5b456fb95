//! In-memory pipe registry backed by the durable pipe store.
//!
//! Keys are casefolded with the network's casemapping, values keep the
//! channel names as they were given when the pipe was created. The store is
//! always written before memory so that a crash in between is repaired by
//! the next `rehydrate`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::irc::CaseMapping;
use crate::storage::{PipeStore, StoreError};

/// One active pipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipe {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Default)]
struct Maps {
    casemapping: CaseMapping,
    /// folded source -> pipe
    by_source: HashMap<String, Pipe>,
    /// folded target -> folded source
    by_target: HashMap<String, String>,
}

impl Maps {
    fn fold(&self, name: &str) -> String {
        self.casemapping.fold(name)
    }

    /// Whether `name` is already either end of some pipe.
    fn in_use(&self, name: &str) -> bool {
        let folded = self.fold(name);
        self.by_source.contains_key(&folded) || self.by_target.contains_key(&folded)
    }
}

/// Thread-safe source <-> target bijection.
#[derive(Clone)]
pub struct PipeRegistry {
    maps: Arc<RwLock<Maps>>,
    store: Arc<dyn PipeStore>,
}

impl PipeRegistry {
    pub fn new(store: Arc<dyn PipeStore>) -> Self {
        Self {
            maps: Arc::new(RwLock::new(Maps::default())),
            store,
        }
    }

    /// Replace the in-memory maps wholesale.
    pub async fn load(&self, pipes: Vec<(String, String)>, casemapping: CaseMapping) {
        let mut maps = Maps {
            casemapping,
            ..Maps::default()
        };
        for (source, target) in pipes {
            if maps.in_use(&source) || maps.in_use(&target) {
                warn!(source = %source, target = %target, "Skipping conflicting stored pipe");
                continue;
            }
            let folded_source = maps.fold(&source);
            let folded_target = maps.fold(&target);
            maps.by_target.insert(folded_target, folded_source.clone());
            maps.by_source.insert(folded_source, Pipe { source, target });
        }
        *self.maps.write().await = maps;
    }

    /// Reload from the store. Returns the number of active pipes.
    pub async fn rehydrate(&self, casemapping: CaseMapping) -> Result<usize, RegistryError> {
        let pipes = self.store.list().await?;
        self.load(pipes, casemapping).await;
        let count = self.maps.read().await.by_source.len();
        info!(count, "Pipe registry loaded");
        Ok(count)
    }

    /// Create a pipe, persisting it first.
    pub async fn add_pipe(
        &self,
        source: &str,
        target: &str,
        reason: &str,
    ) -> Result<Pipe, RegistryError> {
        let mut maps = self.maps.write().await;
        if maps.in_use(source) {
            return Err(RegistryError::AlreadyPiped(source.to_string()));
        }
        if maps.in_use(target) {
            return Err(RegistryError::AlreadyPiped(target.to_string()));
        }

        self.store.add(source, target, reason).await?;

        let pipe = Pipe {
            source: source.to_string(),
            target: target.to_string(),
        };
        let folded_source = maps.fold(source);
        let folded_target = maps.fold(target);
        maps.by_target.insert(folded_target, folded_source.clone());
        maps.by_source.insert(folded_source, pipe.clone());

        info!(source = %source, target = %target, reason = %reason, "Pipe created");
        Ok(pipe)
    }

    /// Remove the pipe for `source`, store first. Vacating the target is up
    /// to the caller.
    pub async fn remove_pipe(&self, source: &str) -> Result<Pipe, RegistryError> {
        let mut maps = self.maps.write().await;
        let folded_source = maps.fold(source);
        let Some(pipe) = maps.by_source.get(&folded_source).cloned() else {
            return Err(RegistryError::NotAPipeSource(source.to_string()));
        };

        self.store.remove(&pipe.source).await?;

        let folded_target = maps.fold(&pipe.target);
        maps.by_source.remove(&folded_source);
        maps.by_target.remove(&folded_target);

        info!(source = %pipe.source, target = %pipe.target, "Pipe removed");
        Ok(pipe)
    }

    /// Pipe whose source is `source`.
    pub async fn by_source(&self, source: &str) -> Option<Pipe> {
        let maps = self.maps.read().await;
        maps.by_source.get(&maps.fold(source)).cloned()
    }

    /// Pipe whose target is `target`.
    pub async fn by_target(&self, target: &str) -> Option<Pipe> {
        let maps = self.maps.read().await;
        maps.by_target
            .get(&maps.fold(target))
            .and_then(|source| maps.by_source.get(source))
            .cloned()
    }

    pub async fn target_for(&self, source: &str) -> Option<String> {
        self.by_source(source).await.map(|p| p.target)
    }

    pub async fn source_for(&self, target: &str) -> Option<String> {
        self.by_target(target).await.map(|p| p.source)
    }

    /// Whether `name` is the source or target of any pipe.
    pub async fn is_piped(&self, name: &str) -> bool {
        self.maps.read().await.in_use(name)
    }

    /// All pipes, sorted by source.
    pub async fn list_pipes(&self) -> Vec<Pipe> {
        let mut pipes: Vec<Pipe> = self.maps.read().await.by_source.values().cloned().collect();
        pipes.sort_by(|a, b| a.source.cmp(&b.source));
        pipes
    }

    pub async fn pipe_count(&self) -> usize {
        self.maps.read().await.by_source.len()
    }

    #[cfg(test)]
    async fn is_consistent(&self) -> bool {
        let maps = self.maps.read().await;
        maps.by_source.len() == maps.by_target.len()
            && maps.by_source.iter().all(|(folded_source, pipe)| {
                maps.by_target.get(&maps.fold(&pipe.target)) == Some(folded_source)
            })
    }
}

/// Registry operation errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("{0} is already piped")]
    AlreadyPiped(String),

    #[error("{0} is not a pipe source")]
    NotAPipeSource(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
