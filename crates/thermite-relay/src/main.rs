//! thermite
//!
//! Relays IRC source channels into per-source target channels, buffering
//! activity while nobody is there to read it.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::info;

use thermite_core::config::load_config;
use thermite_core::tracing_init::{default_filter, init_tracing};
use thermite_relay::buffer::BacklogBuffer;
use thermite_relay::commands::{CommandDispatcher, PipeSettings};
use thermite_relay::irc::IrcHandle;
use thermite_relay::registry::PipeRegistry;
use thermite_relay::relay::{Delivery, Ingest, Presence, RelayCore, Role, drive};
use thermite_relay::storage::RelayDatabase;
use thermite_relay::transport::Transport;

#[derive(Parser, Debug)]
#[command(name = "thermite")]
#[command(version, about = "thermite - IRC channel pipe relay with presence-aware backlog")]
struct Args {
    /// Path to the TOML config file.
    config: PathBuf,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "THERMITE_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    init_tracing(&default_filter(&config.log_level), args.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        split = config.is_split(),
        "Starting thermite"
    );

    let db_path = config
        .database_path()
        .ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    info!(path = %db_path.display(), "Opening pipe database");
    let db = RelayDatabase::open(&db_path).await?;

    let registry = PipeRegistry::new(Arc::new(db));
    let backlog = BacklogBuffer::new(config.backlog_max);

    let write = IrcHandle::new("write", config.write.clone());
    let read = config.read.clone().map(|c| IrcHandle::new("read", c));

    let write_transport: Arc<dyn Transport> = Arc::new(write.clone());
    let read_transport: Arc<dyn Transport> = match &read {
        Some(read) => Arc::new(read.clone()),
        None => Arc::clone(&write_transport),
    };

    let presence = Presence::new(
        Arc::clone(&write_transport),
        config.service_hostnames.clone(),
    );
    let core = RelayCore::new(
        registry,
        backlog,
        Arc::new(presence),
        Arc::clone(&write_transport),
        &config.admin_channel,
    );
    let commands = CommandDispatcher::new(
        core.clone(),
        Arc::clone(&read_transport),
        PipeSettings {
            pipe_name: config.pipe_name.clone(),
            make_pipe: config.make_pipe.clone(),
        },
    );
    let ingest: Arc<dyn Role> = Arc::new(Ingest::new(core.clone(), read_transport));
    let delivery: Arc<dyn Role> = Arc::new(Delivery::new(core, commands));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    let (write_tx, write_rx) = mpsc::unbounded_channel();
    let rx = shutdown_rx.clone();
    tasks.push(tokio::spawn(async move { write.run(write_tx, rx).await }));

    if let Some(read) = read {
        let (read_tx, read_rx) = mpsc::unbounded_channel();
        let rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move { read.run(read_tx, rx).await }));
        tasks.push(tokio::spawn(drive(read_rx, vec![ingest])));
        tasks.push(tokio::spawn(drive(write_rx, vec![delivery])));
    } else {
        tasks.push(tokio::spawn(drive(write_rx, vec![ingest, delivery])));
    }

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");
    let _ = shutdown_tx.send(true);

    for task in tasks {
        task.await?;
    }

    info!("thermite stopped");
    Ok(())
}
