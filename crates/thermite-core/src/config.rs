//! Configuration loading for thermite.
//!
//! Resolution order:
//! 1. Built-in defaults
//! 2. TOML config file (path given on the command line)
//! 3. Environment variables (`THERMITE_*`)
//!
//! A config with no `[read]` block describes a single-connection deployment:
//! the `[write]` connection both observes sources and delivers to targets.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Characters a channel name may start with before the network tells us
/// its real `CHANTYPES`.
const CHANNEL_PREFIXES: &[char] = &['#', '&', '+', '!'];

/// Complete thermite configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Admin/log channel. Commands are accepted here and in pipe targets.
    pub admin_channel: String,
    /// Target channel name template; every `?` becomes a random hex digit.
    #[serde(default = "default_pipe_name")]
    pub pipe_name: String,
    /// Raw lines sent after joining a freshly created target, with `{TARGET}`
    /// and `{HOSTNAME}` substituted.
    #[serde(default)]
    pub make_pipe: Vec<String>,
    /// Hostnames whose occupants are services, not humans.
    #[serde(default)]
    pub service_hostnames: Vec<String>,
    /// Per-source backlog capacity.
    #[serde(default = "default_backlog_max")]
    pub backlog_max: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Connection that delivers to targets and takes commands.
    pub write: ConnectionConfig,
    /// Optional connection that observes sources.
    #[serde(default)]
    pub read: Option<ConnectionConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

/// One IRC connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_tls")]
    pub tls: bool,
    pub nickname: String,
    pub username: Option<String>,
    pub realname: Option<String>,
    /// Server password, sent as `PASS`.
    pub password: Option<String>,
    /// Pinned SHA-256 certificate fingerprint (hex, colons optional).
    pub fingerprint: Option<String>,
}

impl ConnectionConfig {
    pub fn username(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.nickname)
    }

    pub fn realname(&self) -> &str {
        self.realname.as_deref().unwrap_or(&self.nickname)
    }

    /// Pinned fingerprint as lowercase hex without separators.
    pub fn pinned_fingerprint(&self) -> Option<String> {
        self.fingerprint.as_ref().map(|fp| {
            fp.chars()
                .filter(char::is_ascii_hexdigit)
                .collect::<String>()
                .to_ascii_lowercase()
        })
    }

    fn validate(&self, side: &str) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config(format!("{side}.host must not be empty")));
        }
        if self.nickname.is_empty() || self.nickname.contains([' ', ',', '*', '?', '!', '@']) {
            return Err(Error::Config(format!(
                "{side}.nickname '{}' is not a valid nickname",
                self.nickname
            )));
        }
        if let Some(fp) = self.pinned_fingerprint() {
            if fp.len() != 64 {
                return Err(Error::Config(format!(
                    "{side}.fingerprint must be a SHA-256 digest (64 hex digits)"
                )));
            }
        }
        Ok(())
    }
}

fn default_pipe_name() -> String {
    "#thermite-????".to_string()
}

const fn default_backlog_max() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_port() -> u16 {
    6697
}

const fn default_tls() -> bool {
    true
}

impl Config {
    /// Parse a config from TOML text without applying environment overrides.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.admin_channel.starts_with(CHANNEL_PREFIXES) {
            return Err(Error::Config(format!(
                "admin_channel '{}' is not a channel name",
                self.admin_channel
            )));
        }
        if !self.pipe_name.starts_with(CHANNEL_PREFIXES) {
            return Err(Error::Config(format!(
                "pipe_name '{}' is not a channel name",
                self.pipe_name
            )));
        }
        if self.backlog_max == 0 {
            return Err(Error::Config("backlog_max must be at least 1".into()));
        }
        self.write.validate("write")?;
        if let Some(read) = &self.read {
            read.validate("read")?;
        }
        Ok(())
    }

    /// Whether sources are observed on a separate connection.
    pub const fn is_split(&self) -> bool {
        self.read.is_some()
    }

    /// Database path from config, falling back to `~/.thermite/thermite.db`.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.database.path.clone().or_else(default_database_path)
    }
}

/// Default location of the pipe table.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".thermite").join("thermite.db"))
}

/// Load configuration from `path` and apply environment overrides.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    let mut config: Config = toml::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })?;

    apply_overrides(&mut config, |key| std::env::var(key).ok());
    config.validate()?;

    Ok(config)
}

/// Apply `THERMITE_*` overrides looked up through `lookup`.
pub fn apply_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup("THERMITE_DB_PATH") {
        config.database.path = Some(PathBuf::from(val));
    }
    if let Some(val) = lookup("THERMITE_ADMIN_CHANNEL") {
        config.admin_channel = val;
    }
    if let Some(val) = lookup("THERMITE_LOG_LEVEL") {
        config.log_level = val;
    }
    if let Some(val) = lookup("THERMITE_WRITE_PASSWORD") {
        config.write.password = Some(val);
    }
    if let Some(val) = lookup("THERMITE_READ_PASSWORD") {
        if let Some(read) = config.read.as_mut() {
            read.password = Some(val);
        }
    }
}
