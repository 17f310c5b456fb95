//! Shared fakes for relay unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::buffer::BacklogBuffer;
use crate::irc::{CaseMapping, Occupant};
use crate::registry::PipeRegistry;
use crate::relay::{Presence, RelayCore};
use crate::storage::{PipeStore, RelayDatabase, StoreError};
use crate::transport::{Transport, TransportError};

pub const HOSTNAME: &str = "bot.example";

/// Build an occupant with a full hostmask.
pub fn occupant(nick: &str, host: &str) -> Occupant {
    Occupant {
        nickname: nick.to_string(),
        username: Some(nick.to_lowercase()),
        hostname: Some(host.to_string()),
        status: String::new(),
    }
}

/// In-memory transport recording every line sent through it.
pub struct RecordingTransport {
    nick: String,
    connected: AtomicBool,
    fail_sends: AtomicBool,
    sent: Mutex<Vec<String>>,
    rosters: Mutex<HashMap<String, Vec<Occupant>>>,
    existing: Mutex<HashSet<String>>,
}

impl RecordingTransport {
    pub fn new(nick: &str) -> Self {
        Self {
            nick: nick.to_string(),
            connected: AtomicBool::new(true),
            fail_sends: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            rosters: Mutex::new(HashMap::new()),
            existing: Mutex::new(HashSet::new()),
        }
    }

    fn key(channel: &str) -> String {
        CaseMapping::Rfc1459.fold(channel)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub async fn set_occupants(&self, channel: &str, occupants: Vec<Occupant>) {
        self.rosters.lock().await.insert(Self::key(channel), occupants);
    }

    pub async fn mark_existing(&self, channel: &str) {
        self.existing.lock().await.insert(Self::key(channel));
    }

    pub async fn sent(&self) -> Vec<String> {
        self.sent.lock().await.clone()
    }

    pub async fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut *self.sent.lock().await)
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn own_nick(&self) -> String {
        self.nick.clone()
    }

    async fn own_mask_len(&self) -> usize {
        self.nick.len() + 1 + self.nick.len() + 1 + HOSTNAME.len()
    }

    async fn own_hostname(&self) -> Option<String> {
        Some(HOSTNAME.to_string())
    }

    async fn casemapping(&self) -> CaseMapping {
        CaseMapping::Rfc1459
    }

    async fn is_channel(&self, name: &str) -> bool {
        name.len() > 1 && name.starts_with(['#', '&']) && !name.contains([' ', ','])
    }

    async fn occupants(&self, channel: &str) -> Vec<Occupant> {
        self.rosters
            .lock()
            .await
            .get(&Self::key(channel))
            .cloned()
            .unwrap_or_default()
    }

    async fn send_raw(&self, line: &str) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.sent.lock().await.push(line.to_string());
        Ok(())
    }

    async fn channel_exists(&self, channel: &str) -> Result<bool, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        Ok(self.existing.lock().await.contains(&Self::key(channel)))
    }
}

/// Store whose every operation fails.
pub struct FailingStore;

#[async_trait]
impl PipeStore for FailingStore {
    async fn add(&self, _source: &str, _target: &str, _reason: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("database is locked".into()))
    }

    async fn remove(&self, _source: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("database is locked".into()))
    }

    async fn list(&self) -> Result<Vec<(String, String)>, StoreError> {
        Err(StoreError::Unavailable("database is locked".into()))
    }
}

/// A relay core over an in-memory database and one recording transport.
pub struct Harness {
    pub core: RelayCore,
    pub registry: PipeRegistry,
    pub backlog: BacklogBuffer,
    pub write: Arc<RecordingTransport>,
    pub db: RelayDatabase,
}

pub const ADMIN: &str = "#thermite";

pub async fn harness() -> Harness {
    let db = RelayDatabase::open_in_memory().await.unwrap();
    let registry = PipeRegistry::new(Arc::new(db.clone()));
    let backlog = BacklogBuffer::default();
    let write = Arc::new(RecordingTransport::new("relay"));
    let write_dyn: Arc<dyn Transport> = Arc::clone(&write) as Arc<dyn Transport>;
    let presence = Presence::new(
        Arc::clone(&write_dyn),
        vec!["services.libera.chat".into()],
    );
    let core = RelayCore::new(
        registry.clone(),
        backlog.clone(),
        Arc::new(presence),
        write_dyn,
        ADMIN,
    );
    Harness {
        core,
        registry,
        backlog,
        write,
        db,
    }
}
