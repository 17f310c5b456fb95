//! Command execution.
//!
//! Every command produces zero or more reply lines for the channel it was
//! issued in. Failures become a single reply line and never escape.

use std::sync::Arc;

use rand::RngExt;
use tracing::{info, warn};

use super::parser::Command;
use crate::irc::Occupant;
use crate::registry::RegistryError;
use crate::relay::RelayCore;
use crate::relay::split::{payload_limit, split_payload};
use crate::storage::StoreError;
use crate::transport::{Transport, TransportError};

/// Characters substituted for each `?` in the target template.
const TARGET_CHARSET: &[u8] = b"0123456789abcdef";
/// Existence checks tried before giving up on finding a free target name.
const MAX_TARGET_ATTEMPTS: usize = 16;

/// How new pipe targets are named and set up.
#[derive(Debug, Clone)]
pub struct PipeSettings {
    /// Target name template, `?` replaced by a random character.
    pub pipe_name: String,
    /// Raw lines sent after joining a new target.
    pub make_pipe: Vec<String>,
}

/// Command failures, rendered as the reply line.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{0} is already piped")]
    AlreadyPiped(String),

    #[error("this isn't a pipe target channel")]
    NotATargetChannel,

    #[error("'{0}' isn't a valid channel name")]
    InvalidChannelName(String),

    #[error("please provide a message to send")]
    EmptyMessage,

    #[error("please provide source channel and reason")]
    MissingArguments,

    #[error("{0} connection isn't available")]
    CollaboratorUnavailable(String),

    #[error("storage unavailable, try again later")]
    StorageUnavailable(String),

    #[error("couldn't find a free target channel name")]
    NoFreeTarget,

    #[error("couldn't send: {0}")]
    Delivery(#[from] TransportError),
}

impl From<RegistryError> for CommandError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::AlreadyPiped(name) => Self::AlreadyPiped(name),
            RegistryError::NotAPipeSource(_) => Self::NotATargetChannel,
            RegistryError::Store(StoreError::Unavailable(reason)) => Self::StorageUnavailable(reason),
        }
    }
}

/// Executes commands against the registry and both connections.
#[derive(Clone)]
pub struct CommandDispatcher {
    core: RelayCore,
    /// Connection observing sources; the write connection itself when only
    /// one is configured.
    read: Arc<dyn Transport>,
    settings: PipeSettings,
}

impl CommandDispatcher {
    pub fn new(core: RelayCore, read: Arc<dyn Transport>, settings: PipeSettings) -> Self {
        Self {
            core,
            read,
            settings,
        }
    }

    /// Run `command` issued in `channel` and return the reply lines.
    pub async fn dispatch(&self, channel: &str, command: Command) -> Vec<String> {
        let name = command.name();
        let result = match command {
            Command::Pipe(args) => self.pipe(&args).await,
            Command::Unpipe => self.unpipe(channel).await,
            Command::Say(text) => self.say(channel, &text).await,
            Command::Names => self.names(channel).await,
            Command::Backlog => self.backlog(channel).await,
            Command::Pipes => Ok(self.pipes().await),
        };

        match result {
            Ok(replies) => replies,
            Err(e) => {
                match &e {
                    CommandError::StorageUnavailable(reason) => {
                        warn!(command = name, channel = %channel, error = %reason, "Command failed");
                    }
                    CommandError::Delivery(_) | CommandError::CollaboratorUnavailable(_) => {
                        warn!(command = name, channel = %channel, error = %e, "Command failed");
                    }
                    _ => {}
                }
                vec![e.to_string()]
            }
        }
    }

    fn read_side(&self) -> Result<&Arc<dyn Transport>, CommandError> {
        if self.read.is_connected() {
            Ok(&self.read)
        } else {
            Err(CommandError::CollaboratorUnavailable("read".into()))
        }
    }

    async fn pipe(&self, args: &str) -> Result<Vec<String>, CommandError> {
        let mut words = args.trim_start().splitn(2, char::is_whitespace);
        let source = words.next().unwrap_or_default();
        let reason = words.next().map(str::trim).unwrap_or_default();
        if source.is_empty() || reason.is_empty() {
            return Err(CommandError::MissingArguments);
        }

        let read = self.read_side()?;
        if !read.is_channel(source).await {
            return Err(CommandError::InvalidChannelName(source.to_string()));
        }
        if self.core.registry().is_piped(source).await {
            return Err(CommandError::AlreadyPiped(source.to_string()));
        }

        let target = self.free_target().await?;
        self.core.write().join(&target).await?;

        if let Err(e) = self.activate(read, source, &target, reason).await {
            self.abandon(read, source, &target).await;
            return Err(e);
        }
        Ok(vec![format!("piped {source} to {target}")])
    }

    /// Set up a joined `target`, join `source` and register the pipe.
    async fn activate(
        &self,
        read: &Arc<dyn Transport>,
        source: &str,
        target: &str,
        reason: &str,
    ) -> Result<(), CommandError> {
        let write = self.core.write();
        let hostname = write.own_hostname().await.unwrap_or_default();
        for template in &self.settings.make_pipe {
            let line = template
                .replace("{TARGET}", target)
                .replace("{HOSTNAME}", &hostname);
            write.send_raw(&line).await?;
        }
        read.join(source).await?;
        self.core.registry().add_pipe(source, target, reason).await?;
        Ok(())
    }

    /// Leave both channels of a pipe that never became active.
    async fn abandon(&self, read: &Arc<dyn Transport>, source: &str, target: &str) {
        if let Err(e) = self.core.write().part(target).await {
            warn!(target = %target, error = %e, "Failed to part abandoned pipe target");
        }
        if let Err(e) = read.part(source).await {
            warn!(source = %source, error = %e, "Failed to part abandoned pipe source");
        }
    }

    /// Generate target names from the template until one is unused.
    async fn free_target(&self) -> Result<String, CommandError> {
        for _ in 0..MAX_TARGET_ATTEMPTS {
            let candidate = self.candidate_target();
            if self.core.registry().is_piped(&candidate).await {
                continue;
            }
            if !self.core.write().channel_exists(&candidate).await? {
                return Ok(candidate);
            }
        }
        Err(CommandError::NoFreeTarget)
    }

    fn candidate_target(&self) -> String {
        let mut rng = rand::rng();
        self.settings
            .pipe_name
            .chars()
            .map(|c| {
                if c == '?' {
                    TARGET_CHARSET[rng.random_range(0..TARGET_CHARSET.len())] as char
                } else {
                    c
                }
            })
            .collect()
    }

    async fn unpipe(&self, channel: &str) -> Result<Vec<String>, CommandError> {
        let Some(source) = self.core.registry().source_for(channel).await else {
            return Err(CommandError::NotATargetChannel);
        };

        let pipe = self.core.registry().remove_pipe(&source).await?;
        self.core.close(&pipe.target).await;
        let dropped = self.core.backlog().clear(&pipe.source).await;
        info!(source = %pipe.source, target = %pipe.target, dropped, "Unpiped");

        self.core.write().part(&pipe.target).await?;
        self.core
            .log(&format!(
                "unpiped {}. part it and destroy {} manually",
                pipe.source, pipe.target
            ))
            .await?;
        Ok(Vec::new())
    }

    async fn say(&self, channel: &str, text: &str) -> Result<Vec<String>, CommandError> {
        if text.trim().is_empty() {
            return Err(CommandError::EmptyMessage);
        }
        let Some(source) = self.core.registry().source_for(channel).await else {
            return Err(CommandError::NotATargetChannel);
        };

        let read = self.read_side()?;
        let limit = payload_limit(read.own_mask_len().await, "PRIVMSG", &source);
        for piece in split_payload(text, limit) {
            read.send_message(&source, piece).await?;
        }
        Ok(Vec::new())
    }

    async fn names(&self, channel: &str) -> Result<Vec<String>, CommandError> {
        let Some(source) = self.core.registry().source_for(channel).await else {
            return Err(CommandError::NotATargetChannel);
        };

        let mut masks: Vec<String> = self
            .read_side()?
            .occupants(&source)
            .await
            .iter()
            .map(Occupant::hostmask)
            .collect();
        masks.sort();
        Ok(masks)
    }

    async fn backlog(&self, channel: &str) -> Result<Vec<String>, CommandError> {
        let count = self
            .core
            .replay(channel)
            .await?
            .ok_or(CommandError::NotATargetChannel)?;
        let noun = if count == 1 { "line" } else { "lines" };
        Ok(vec![format!("replayed {count} backlog {noun}")])
    }

    async fn pipes(&self) -> Vec<String> {
        let pipes = self.core.registry().list_pipes().await;
        if pipes.is_empty() {
            return vec!["no pipes".to_string()];
        }
        let width = pipes.iter().map(|p| p.source.chars().count()).max().unwrap_or(0);
        pipes
            .iter()
            .map(|p| format!("{:<width$} -> {}", p.source, p.target))
            .collect()
    }
}
