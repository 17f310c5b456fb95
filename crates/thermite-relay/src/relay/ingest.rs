//! Read role: observes source channels and routes their activity.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::format::ChannelEvent;
use super::routing::RelayCore;
use super::session::{REGISTRATION_DONE, Role, RoleError};
use crate::irc::Inbound;
use crate::transport::Transport;

pub struct Ingest {
    core: RelayCore,
    read: Arc<dyn Transport>,
}

impl Ingest {
    pub fn new(core: RelayCore, read: Arc<dyn Transport>) -> Self {
        Self { core, read }
    }

    /// Reload pipes and join every source.
    async fn on_registered(&self) -> Result<(), RoleError> {
        let casemapping = self.read.casemapping().await;
        self.core.registry().rehydrate(casemapping).await?;
        for pipe in self.core.registry().list_pipes().await {
            self.read.join(&pipe.source).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Role for Ingest {
    fn name(&self) -> &'static str {
        "ingest"
    }

    async fn handle(&self, inbound: &Inbound) -> Result<(), RoleError> {
        if REGISTRATION_DONE.contains(&inbound.line.command.as_str()) {
            return self.on_registered().await;
        }

        let Some(event) = ChannelEvent::from_inbound(inbound) else {
            return Ok(());
        };
        let text = event.to_string();

        if event.is_identity_scoped() {
            for channel in &inbound.prior_channels {
                if let Err(e) = self.core.route(channel, text.clone()).await {
                    warn!(source = %channel, error = %e, "Failed to relay line");
                }
            }
            return Ok(());
        }

        if let Some(channel) = inbound.line.param(0) {
            self.core.route(channel, text).await?;
        }
        Ok(())
    }
}
