//! Write role: owns target channels, flushes backlogs and takes commands.

use async_trait::async_trait;
use tracing::debug;

use super::routing::RelayCore;
use super::session::{REGISTRATION_DONE, Role, RoleError};
use crate::commands::{CommandDispatcher, parse_highlight};
use crate::irc::Inbound;

pub struct Delivery {
    core: RelayCore,
    commands: CommandDispatcher,
}

impl Delivery {
    pub const fn new(core: RelayCore, commands: CommandDispatcher) -> Self {
        Self { core, commands }
    }

    /// Reload pipes and join the admin channel and every target. Rosters start
    /// over on a new session, so every target starts closed.
    async fn on_registered(&self) -> Result<(), RoleError> {
        let write = self.core.write();
        self.core.close_all().await;
        self.core.registry().rehydrate(write.casemapping().await).await?;
        write.join(self.core.admin_channel()).await?;
        for pipe in self.core.registry().list_pipes().await {
            write.join(&pipe.target).await?;
        }
        Ok(())
    }

    /// A target whose captured roster holds a human is opened, flushing its
    /// backlog the first time.
    async fn on_arrival(&self, inbound: &Inbound, channel: Option<&str>) -> Result<(), RoleError> {
        let Some(channel) = channel else {
            return Ok(());
        };
        if self.core.registry().by_target(channel).await.is_none() {
            return Ok(());
        }

        let humans = self.core.presence().humans_in(inbound.roster(channel)).await;
        if humans.is_empty() {
            return Ok(());
        }
        let count = self.core.flush(channel).await?;
        debug!(target = %channel, readers = humans.len(), count, "Target has readers");
        Ok(())
    }

    /// Targets left without humans are closed.
    async fn on_departure(&self, inbound: &Inbound) {
        for (channel, roster) in &inbound.rosters {
            if self.core.registry().by_target(channel).await.is_none() {
                continue;
            }
            if self.core.presence().humans_in(roster).await.is_empty() {
                self.core.close(channel).await;
            }
        }
    }

    async fn on_privmsg(&self, inbound: &Inbound) -> Result<(), RoleError> {
        let line = &inbound.line;
        let (Some(channel), Some(text), Some(sender)) = (line.param(0), line.param(1), line.nick())
        else {
            return Ok(());
        };

        let write = self.core.write();
        let own_nick = write.own_nick().await;
        let casemapping = write.casemapping().await;
        if casemapping.equals(sender, &own_nick) {
            return Ok(());
        }
        let is_admin = casemapping.equals(channel, self.core.admin_channel());
        if !is_admin && self.core.registry().by_target(channel).await.is_none() {
            return Ok(());
        }

        let Some(command) = parse_highlight(text, &own_nick, casemapping) else {
            return Ok(());
        };
        debug!(command = command.name(), channel = %channel, sender = %sender, "Command received");

        for reply in self.commands.dispatch(channel, command).await {
            self.core.deliver(channel, &reply).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Role for Delivery {
    fn name(&self) -> &'static str {
        "delivery"
    }

    async fn handle(&self, inbound: &Inbound) -> Result<(), RoleError> {
        let command = inbound.line.command.as_str();
        if REGISTRATION_DONE.contains(&command) {
            return self.on_registered().await;
        }
        match command {
            "JOIN" => self.on_arrival(inbound, inbound.line.param(0)).await,
            // RPL_ENDOFNAMES: the roster of a channel we just joined is complete
            "366" => self.on_arrival(inbound, inbound.line.param(1)).await,
            "PART" | "KICK" | "QUIT" | "NICK" => {
                self.on_departure(inbound).await;
                Ok(())
            }
            "PRIVMSG" => self.on_privmsg(inbound).await,
            _ => Ok(()),
        }
    }
}
