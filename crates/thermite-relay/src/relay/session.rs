//! The sequential per-connection event loop.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::irc::Inbound;
use crate::registry::RegistryError;
use crate::transport::TransportError;

/// End-of-registration numerics (`RPL_ENDOFMOTD`, `ERR_NOMOTD`). ISUPPORT has
/// been received by the time either arrives.
pub const REGISTRATION_DONE: &[&str] = &["376", "422"];

/// Failure handling one inbound line.
#[derive(Debug, thiserror::Error)]
pub enum RoleError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// One half of the relay, fed every line from its connection.
#[async_trait]
pub trait Role: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, inbound: &Inbound) -> Result<(), RoleError>;
}

/// Feed every inbound line to each role in turn until the connection's
/// stream ends. Role failures are logged and do not stop the loop.
pub async fn drive(mut inbound: mpsc::UnboundedReceiver<Inbound>, roles: Vec<Arc<dyn Role>>) {
    while let Some(event) = inbound.recv().await {
        for role in &roles {
            if let Err(e) = role.handle(&event).await {
                warn!(
                    role = role.name(),
                    command = %event.line.command,
                    error = %e,
                    "Failed to handle line"
                );
            }
        }
    }
    info!("Inbound stream closed");
}
