//! One IRC connection: registration, reconnection and state tracking.
//!
//! `run` owns the socket and reconnects with exponential backoff. Every
//! inbound line is applied to the shared [`ServerState`] and published as an
//! [`Inbound`] to the role loop consuming this connection. The cloneable
//! [`IrcHandle`] outlives individual sessions and is what the relay engine
//! talks to through the [`Transport`] trait.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use thermite_core::config::ConnectionConfig;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock, mpsc, oneshot, watch};
use tokio::time::{sleep, timeout};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use super::casemap::CaseMapping;
use super::codec::IrcCodec;
use super::message::Line;
use super::state::{Occupant, ServerState};
use super::tls;
use crate::transport::{Transport, TransportError};

/// How long a channel existence check may take.
const EXISTS_TIMEOUT: Duration = Duration::from_secs(10);
/// A session up for longer than this resets the backoff.
const HEALTHY_SESSION: Duration = Duration::from_secs(60);

/// Capabilities requested when the server offers them. `solanum.chat/oper`
/// lets the network tell us when we hold operator privileges.
const WANTED_CAPS: &[&str] = &["multi-prefix", "userhost-in-names", "solanum.chat/oper"];

/// Exponential reconnect delay, doubling from `initial` up to `max`.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl ReconnectPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(16);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// An inbound line plus the context the relay needs, captured at read time.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub line: Line,
    /// For QUIT/NICK: channels the actor shared with us just before this
    /// line was applied.
    pub prior_channels: Vec<String>,
    /// Actor's prefix symbols in the line's channel.
    pub status: String,
    /// For membership changes (JOIN, PART, KICK, QUIT, NICK and end of
    /// NAMES): occupants of each affected channel just after the line.
    pub rosters: Vec<(String, Vec<Occupant>)>,
}

impl Inbound {
    /// Captured occupants of `channel`; empty if none were captured.
    pub fn roster(&self, channel: &str) -> &[Occupant] {
        self.rosters
            .iter()
            .find(|(name, _)| name == channel)
            .map(|(_, occupants)| occupants.as_slice())
            .unwrap_or_default()
    }
}

/// Client registration and capability negotiation.
#[derive(Debug)]
struct Registration {
    nickname: String,
    offered: Vec<String>,
}

impl Registration {
    fn new(nickname: &str) -> Self {
        Self {
            nickname: nickname.to_string(),
            offered: Vec::new(),
        }
    }

    fn opening(&self, config: &ConnectionConfig) -> Vec<String> {
        let mut lines = vec!["CAP LS 302".to_string()];
        if let Some(password) = &config.password {
            lines.push(Line::new("PASS", &[password]).to_string());
        }
        lines.push(Line::new("NICK", &[&self.nickname]).to_string());
        lines.push(
            Line::new("USER", &[config.username(), "0", "*", config.realname()]).to_string(),
        );
        lines
    }

    /// Protocol-level replies owed for `line`.
    fn respond(&mut self, line: &Line, registered: bool) -> Vec<String> {
        match line.command.as_str() {
            "PING" => vec![Line::new("PONG", &[line.param(0).unwrap_or_default()]).to_string()],
            "CAP" => self.respond_cap(line),
            "433" if !registered => {
                self.nickname.push('_');
                vec![Line::new("NICK", &[&self.nickname]).to_string()]
            }
            _ => Vec::new(),
        }
    }

    fn respond_cap(&mut self, line: &Line) -> Vec<String> {
        match line.param(1) {
            Some("LS") => {
                let more = line.params.len() > 3 && line.param(2) == Some("*");
                if let Some(caps) = line.params.last() {
                    self.offered.extend(
                        caps.split(' ')
                            .filter(|c| !c.is_empty())
                            .map(|c| c.split('=').next().unwrap_or(c).to_string()),
                    );
                }
                if more {
                    return Vec::new();
                }
                let request: Vec<&str> = WANTED_CAPS
                    .iter()
                    .copied()
                    .filter(|cap| self.offered.iter().any(|o| o == cap))
                    .collect();
                if request.is_empty() {
                    vec!["CAP END".to_string()]
                } else {
                    vec![Line::new("CAP", &["REQ", &request.join(" ")]).to_string()]
                }
            }
            Some("ACK" | "NAK") => vec!["CAP END".to_string()],
            _ => Vec::new(),
        }
    }
}

struct Inner {
    /// `write` or `read`, for logs.
    side: &'static str,
    config: ConnectionConfig,
    state: RwLock<ServerState>,
    outbound: RwLock<Option<mpsc::UnboundedSender<String>>>,
    connected: AtomicBool,
    exists_waiters: Mutex<HashMap<String, Vec<oneshot::Sender<bool>>>>,
}

/// Cloneable handle to one connection.
#[derive(Clone)]
pub struct IrcHandle {
    inner: Arc<Inner>,
}

impl IrcHandle {
    pub fn new(side: &'static str, config: ConnectionConfig) -> Self {
        let state = ServerState::new(&config.nickname);
        Self {
            inner: Arc::new(Inner {
                side,
                config,
                state: RwLock::new(state),
                outbound: RwLock::new(None),
                connected: AtomicBool::new(false),
                exists_waiters: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Run the connection with automatic reconnection until `shutdown` fires.
    pub async fn run(
        &self,
        inbound: mpsc::UnboundedSender<Inbound>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let policy = ReconnectPolicy::default();
        let mut attempt: u32 = 0;
        let side = self.inner.side;

        loop {
            if *shutdown.borrow() {
                info!(side, "Connection shutting down");
                return;
            }

            let started = Instant::now();
            let result = self.session(&inbound, &mut shutdown).await;
            self.mark_disconnected().await;

            match result {
                Ok(()) => {
                    info!(side, "Connection closed cleanly");
                    return;
                }
                Err(e) => {
                    if started.elapsed() > HEALTHY_SESSION {
                        attempt = 0;
                    }
                    let delay = policy.delay_for_attempt(attempt);
                    warn!(side, error = %e, attempt, delay_secs = delay.as_secs(), "Reconnecting");

                    tokio::select! {
                        () = sleep(delay) => {}
                        _ = shutdown.changed() => {
                            info!(side, "Connection shutting down during reconnect wait");
                            return;
                        }
                    }
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    async fn session(
        &self,
        inbound: &mpsc::UnboundedSender<Inbound>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), TransportError> {
        let config = &self.inner.config;
        info!(side = self.inner.side, host = %config.host, port = config.port, tls = config.tls, "Connecting");

        let tcp = TcpStream::connect((config.host.as_str(), config.port)).await?;
        if config.tls {
            let connector = tls::connector(config.pinned_fingerprint())
                .map_err(|e| TransportError::Tls(e.to_string()))?;
            let name =
                tls::server_name(&config.host).map_err(|e| TransportError::Tls(e.to_string()))?;
            let stream = connector.connect(name, tcp).await?;
            self.drive(Framed::new(stream, IrcCodec::default()), inbound, shutdown)
                .await
        } else {
            self.drive(Framed::new(tcp, IrcCodec::default()), inbound, shutdown)
                .await
        }
    }

    async fn drive<S>(
        &self,
        mut framed: Framed<S, IrcCodec>,
        inbound: &mpsc::UnboundedSender<Inbound>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), TransportError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let side = self.inner.side;
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        *self.inner.outbound.write().await = Some(tx);
        self.inner
            .state
            .write()
            .await
            .reset(&self.inner.config.nickname);

        let mut registration = Registration::new(&self.inner.config.nickname);
        for line in registration.opening(&self.inner.config) {
            framed.send(line).await?;
        }

        loop {
            tokio::select! {
                incoming = framed.next() => {
                    let Some(raw) = incoming else {
                        return Err(TransportError::Closed);
                    };
                    let raw = raw?;
                    debug!(side, "< {raw}");
                    let Some(line) = Line::parse(&raw) else {
                        continue;
                    };

                    let registered = self.is_connected();
                    for reply in registration.respond(&line, registered) {
                        debug!(side, "> {reply}");
                        framed.send(reply).await?;
                    }
                    if line.command == "ERROR" {
                        warn!(side, reason = line.param(0).unwrap_or_default(), "Server closed the link");
                        return Err(TransportError::Closed);
                    }

                    let event = self.observe(line).await;
                    if inbound.send(event).is_err() {
                        // role loop is gone; nothing left to relay for
                        return Ok(());
                    }
                }
                Some(out) = rx.recv() => {
                    debug!(side, "> {out}");
                    framed.send(out).await?;
                }
                _ = shutdown.changed() => {
                    let _ = framed.send("QUIT :shutting down".to_string()).await;
                    return Ok(());
                }
            }
        }
    }

    /// Apply `line` to state and capture the context roles need.
    async fn observe(&self, line: Line) -> Inbound {
        let mut state = self.inner.state.write().await;
        let actor = line.nick().map(ToString::to_string);

        let prior_channels = match (line.command.as_str(), &actor) {
            ("QUIT" | "NICK", Some(nick)) => state.user_channels(nick),
            _ => Vec::new(),
        };

        state.apply(&line);

        let channel = line.param(0).filter(|c| state.is_channel(c));
        let status = match (channel, &actor) {
            (Some(channel), Some(nick)) => state.status(channel, nick),
            _ => String::new(),
        };
        let affected: Vec<String> = match line.command.as_str() {
            "JOIN" | "PART" | "KICK" => channel.map(ToString::to_string).into_iter().collect(),
            "366" => line.param(1).map(ToString::to_string).into_iter().collect(),
            "QUIT" | "NICK" => prior_channels.clone(),
            _ => Vec::new(),
        };
        let rosters = affected
            .into_iter()
            .map(|c| {
                let occupants = state.occupants(&c);
                (c, occupants)
            })
            .collect();

        let answer = match line.command.as_str() {
            "324" | "329" => line.param(1).map(|c| (state.casefold(c), true)),
            "403" => line.param(1).map(|c| (state.casefold(c), false)),
            _ => None,
        };

        if line.command == "001" {
            self.inner.connected.store(true, Ordering::SeqCst);
            info!(side = self.inner.side, nickname = %state.nickname, "Registered with server");
        }
        drop(state);

        if let Some((key, exists)) = answer {
            if let Some(waiters) = self.inner.exists_waiters.lock().await.remove(&key) {
                for waiter in waiters {
                    let _ = waiter.send(exists);
                }
            }
        }

        Inbound {
            line,
            prior_channels,
            status,
            rosters,
        }
    }

    async fn mark_disconnected(&self) {
        self.inner.connected.store(false, Ordering::SeqCst);
        *self.inner.outbound.write().await = None;
        // dropping the senders fails every outstanding existence check with Closed
        self.inner.exists_waiters.lock().await.clear();
    }
}

#[async_trait]
impl Transport for IrcHandle {
    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    async fn own_nick(&self) -> String {
        self.inner.state.read().await.nickname.clone()
    }

    async fn own_mask_len(&self) -> usize {
        self.inner.state.read().await.own_mask_len()
    }

    async fn own_hostname(&self) -> Option<String> {
        self.inner.state.read().await.hostname.clone()
    }

    async fn casemapping(&self) -> CaseMapping {
        self.inner.state.read().await.casemapping()
    }

    async fn is_channel(&self, name: &str) -> bool {
        self.inner.state.read().await.is_channel(name)
    }

    async fn occupants(&self, channel: &str) -> Vec<Occupant> {
        self.inner.state.read().await.occupants(channel)
    }

    async fn send_raw(&self, line: &str) -> Result<(), TransportError> {
        let outbound = self.inner.outbound.read().await;
        let tx = outbound.as_ref().ok_or(TransportError::NotConnected)?;
        tx.send(line.to_string())
            .map_err(|_| TransportError::Closed)
    }

    async fn channel_exists(&self, channel: &str) -> Result<bool, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let key = self.inner.state.read().await.casefold(channel);
        let (tx, rx) = oneshot::channel();
        self.inner
            .exists_waiters
            .lock()
            .await
            .entry(key.clone())
            .or_default()
            .push(tx);

        self.send(Line::new("MODE", &[channel])).await?;

        match timeout(EXISTS_TIMEOUT, rx).await {
            Ok(Ok(exists)) => Ok(exists),
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => {
                self.inner.exists_waiters.lock().await.remove(&key);
                Err(TransportError::Timeout(format!("MODE {channel}")))
            }
        }
    }
}
