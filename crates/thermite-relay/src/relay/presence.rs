//! Who can read a target channel right now.

use std::sync::Arc;

use async_trait::async_trait;

use crate::irc::{CaseMapping, Occupant};
use crate::transport::Transport;

/// Reports the human occupants of a channel.
#[async_trait]
pub trait PresenceOracle: Send + Sync {
    /// Nicknames of the humans in `channel` right now.
    async fn human_occupants(&self, channel: &str) -> Vec<String>;

    /// Humans among an already captured `roster`.
    async fn humans_in(&self, roster: &[Occupant]) -> Vec<String>;
}

/// Presence derived from a connection's tracked rosters. Ourselves and
/// anyone on a service hostname do not count.
#[derive(Clone)]
pub struct Presence {
    transport: Arc<dyn Transport>,
    service_hostnames: Vec<String>,
}

impl Presence {
    pub fn new(transport: Arc<dyn Transport>, service_hostnames: Vec<String>) -> Self {
        Self {
            transport,
            service_hostnames,
        }
    }

    pub fn is_human(&self, occupant: &Occupant, own_nick: &str, casemapping: CaseMapping) -> bool {
        if casemapping.equals(&occupant.nickname, own_nick) {
            return false;
        }
        occupant.hostname.as_deref().is_none_or(|host| {
            !self
                .service_hostnames
                .iter()
                .any(|service| service.eq_ignore_ascii_case(host))
        })
    }
}

#[async_trait]
impl PresenceOracle for Presence {
    async fn human_occupants(&self, channel: &str) -> Vec<String> {
        let roster = self.transport.occupants(channel).await;
        self.humans_in(&roster).await
    }

    async fn humans_in(&self, roster: &[Occupant]) -> Vec<String> {
        let own_nick = self.transport.own_nick().await;
        let casemapping = self.transport.casemapping().await;
        roster
            .iter()
            .filter(|o| self.is_human(o, &own_nick, casemapping))
            .map(|o| o.nickname.clone())
            .collect()
    }
}
