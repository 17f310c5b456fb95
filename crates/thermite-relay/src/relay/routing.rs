//! Routing of relayed lines between backlog and live delivery.
//!
//! Whether a target has an audience is tracked here, not read off the live
//! roster. Only the delivering role opens or closes a target, in the order its
//! connection saw the joins and parts, so a line routed from the other
//! connection can never overtake the backlog flush that opens a target.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::presence::PresenceOracle;
use super::split::{payload_limit, split_payload};
use crate::buffer::BacklogBuffer;
use crate::registry::PipeRegistry;
use crate::transport::{Transport, TransportError};

/// What happened to a routed line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    /// The channel is not a pipe source.
    Ignored,
    /// Buffered only; nobody is reading the target.
    Buffered,
    /// Buffered and delivered live.
    Delivered,
}

/// Shared relay state: pipes, backlog, presence and the delivering connection.
#[derive(Clone)]
pub struct RelayCore {
    registry: PipeRegistry,
    backlog: BacklogBuffer,
    presence: Arc<dyn PresenceOracle>,
    write: Arc<dyn Transport>,
    admin_channel: String,
    /// Targets with a human audience. Held across every delivery to a target
    /// so flushed and live lines go out in append order.
    audience: Arc<Mutex<HashSet<String>>>,
}

impl RelayCore {
    pub fn new(
        registry: PipeRegistry,
        backlog: BacklogBuffer,
        presence: Arc<dyn PresenceOracle>,
        write: Arc<dyn Transport>,
        admin_channel: &str,
    ) -> Self {
        Self {
            registry,
            backlog,
            presence,
            write,
            admin_channel: admin_channel.to_string(),
            audience: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub const fn registry(&self) -> &PipeRegistry {
        &self.registry
    }

    pub const fn backlog(&self) -> &BacklogBuffer {
        &self.backlog
    }

    pub fn presence(&self) -> &dyn PresenceOracle {
        self.presence.as_ref()
    }

    pub fn write(&self) -> &Arc<dyn Transport> {
        &self.write
    }

    pub fn admin_channel(&self) -> &str {
        &self.admin_channel
    }

    /// Relay a formatted line from `source`.
    ///
    /// The line always goes to the backlog first, then live to the target if
    /// the target has been opened and still has a human in it. Finding it
    /// empty closes it.
    pub async fn route(&self, source: &str, line: String) -> Result<Routed, TransportError> {
        let Some(pipe) = self.registry.by_source(source).await else {
            return Ok(Routed::Ignored);
        };

        let mut audience = self.audience.lock().await;
        self.backlog.append(&pipe.source, line.clone()).await;

        if !audience.contains(&pipe.target) {
            debug!(source = %pipe.source, target = %pipe.target, "Target closed, buffered");
            return Ok(Routed::Buffered);
        }
        if self.presence.human_occupants(&pipe.target).await.is_empty() {
            // readers left before the delivering role saw them go
            audience.remove(&pipe.target);
            debug!(source = %pipe.source, target = %pipe.target, "Nobody in target, buffered");
            return Ok(Routed::Buffered);
        }

        self.deliver(&pipe.target, &line).await?;
        Ok(Routed::Delivered)
    }

    /// Open `target` to live delivery, first draining its pipe's backlog into
    /// it. Returns the number of lines flushed; an already open target is
    /// left alone. On a failed send the backlog is kept and the target stays
    /// closed.
    pub async fn flush(&self, target: &str) -> Result<usize, TransportError> {
        let Some(pipe) = self.registry.by_target(target).await else {
            return Ok(0);
        };

        let mut audience = self.audience.lock().await;
        if audience.contains(&pipe.target) {
            return Ok(0);
        }

        let lines = self.backlog.peek(&pipe.source).await;
        for line in &lines {
            self.deliver(&pipe.target, line).await?;
        }
        self.backlog.drain(&pipe.source).await;
        audience.insert(pipe.target.clone());

        if !lines.is_empty() {
            info!(source = %pipe.source, target = %pipe.target, count = lines.len(), "Backlog flushed");
        }
        Ok(lines.len())
    }

    /// Stop live delivery to `target`; lines buffer until the next flush.
    /// `target` need not still be piped.
    pub async fn close(&self, target: &str) {
        let key = match self.registry.by_target(target).await {
            Some(pipe) => pipe.target,
            None => target.to_string(),
        };
        if self.audience.lock().await.remove(&key) {
            debug!(target = %key, "Target audience gone");
        }
    }

    /// Close every target, as after reconnecting.
    pub async fn close_all(&self) {
        self.audience.lock().await.clear();
    }

    pub async fn is_open(&self, target: &str) -> bool {
        match self.registry.by_target(target).await {
            Some(pipe) => self.audience.lock().await.contains(&pipe.target),
            None => false,
        }
    }

    /// Deliver the backlog of the pipe targeting `target` without consuming
    /// it. `None` if `target` is not a pipe target.
    pub async fn replay(&self, target: &str) -> Result<Option<usize>, TransportError> {
        let Some(pipe) = self.registry.by_target(target).await else {
            return Ok(None);
        };

        let _audience = self.audience.lock().await;
        let lines = self.backlog.peek(&pipe.source).await;
        for line in &lines {
            self.deliver(&pipe.target, line).await?;
        }
        Ok(Some(lines.len()))
    }

    /// Send `text` to `channel` as notices, split to fit the line limit.
    pub async fn deliver(&self, channel: &str, text: &str) -> Result<(), TransportError> {
        let limit = payload_limit(self.write.own_mask_len().await, "NOTICE", channel);
        for piece in split_payload(text, limit) {
            self.write.send_notice(channel, piece).await?;
        }
        Ok(())
    }

    /// Report to the admin channel.
    pub async fn log(&self, text: &str) -> Result<(), TransportError> {
        self.deliver(&self.admin_channel, text).await
    }
}
