//! The chat connection as seen by the relay engine.
//!
//! `IrcHandle` is the production implementation; tests use an in-memory
//! recording transport.

use async_trait::async_trait;

use crate::irc::{CaseMapping, Line, Occupant};

/// Transport errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Not connected")]
    NotConnected,

    #[error("Connection closed")]
    Closed,

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("TLS error: {0}")]
    Tls(String),
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// One connection to the network.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Registered and able to send.
    fn is_connected(&self) -> bool;

    async fn own_nick(&self) -> String;

    /// Length of our `nick!user@host` as other clients will see it.
    async fn own_mask_len(&self) -> usize;

    /// Our own hostname as the network displays it, once known.
    async fn own_hostname(&self) -> Option<String>;

    async fn casemapping(&self) -> CaseMapping;

    async fn is_channel(&self, name: &str) -> bool;

    /// Current occupants of `channel`, ourselves included.
    async fn occupants(&self, channel: &str) -> Vec<Occupant>;

    /// Send a raw protocol line.
    async fn send_raw(&self, line: &str) -> Result<(), TransportError>;

    /// Whether `channel` exists on the network, via a request/response round-trip.
    async fn channel_exists(&self, channel: &str) -> Result<bool, TransportError>;

    async fn send(&self, line: Line) -> Result<(), TransportError> {
        self.send_raw(&line.to_string()).await
    }

    async fn join(&self, channel: &str) -> Result<(), TransportError> {
        self.send(Line::join(channel)).await
    }

    async fn part(&self, channel: &str) -> Result<(), TransportError> {
        self.send(Line::part(channel)).await
    }

    async fn send_message(&self, target: &str, text: &str) -> Result<(), TransportError> {
        self.send(Line::privmsg(target, text)).await
    }

    async fn send_notice(&self, target: &str, text: &str) -> Result<(), TransportError> {
        self.send(Line::notice(target, text)).await
    }
}
