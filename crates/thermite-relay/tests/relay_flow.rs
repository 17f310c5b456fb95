#![allow(clippy::unwrap_used)] // Integration tests use unwrap for brevity

//! End-to-end relay flow against a scripted IRC server on localhost.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_util::codec::Framed;

use thermite_core::config::ConnectionConfig;
use thermite_relay::buffer::BacklogBuffer;
use thermite_relay::commands::{CommandDispatcher, PipeSettings};
use thermite_relay::irc::IrcHandle;
use thermite_relay::irc::codec::IrcCodec;
use thermite_relay::registry::PipeRegistry;
use thermite_relay::relay::{Delivery, Ingest, Presence, RelayCore, Role, drive};
use thermite_relay::storage::RelayDatabase;
use thermite_relay::transport::Transport;

const ADMIN: &str = "#thermite";
const ME: &str = ":relay!relay@bot.example";

struct Server {
    framed: Framed<TcpStream, IrcCodec>,
}

impl Server {
    async fn send(&mut self, line: &str) {
        self.framed.send(line.to_string()).await.unwrap();
    }

    /// Read client lines until one satisfies `matches`, skipping the rest.
    async fn wait_for(&mut self, matches: impl Fn(&str) -> bool) -> String {
        loop {
            let line = timeout(Duration::from_secs(5), self.framed.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            if matches(&line) {
                return line;
            }
        }
    }

    async fn expect(&mut self, expected: &str) {
        let line = self.wait_for(|l| l == expected).await;
        assert_eq!(line, expected);
    }
}

struct Relay {
    db: RelayDatabase,
    shutdown: watch::Sender<bool>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

async fn start_relay(port: u16) -> Relay {
    let db = RelayDatabase::open_in_memory().await.unwrap();
    let handle = IrcHandle::new(
        "write",
        ConnectionConfig {
            host: "127.0.0.1".into(),
            port,
            tls: false,
            nickname: "relay".into(),
            username: None,
            realname: None,
            password: None,
            fingerprint: None,
        },
    );
    let transport: Arc<dyn Transport> = Arc::new(handle.clone());

    let core = RelayCore::new(
        PipeRegistry::new(Arc::new(db.clone())),
        BacklogBuffer::default(),
        Arc::new(Presence::new(
            Arc::clone(&transport),
            vec!["services.example".into()],
        )),
        Arc::clone(&transport),
        ADMIN,
    );
    let commands = CommandDispatcher::new(
        core.clone(),
        Arc::clone(&transport),
        PipeSettings {
            pipe_name: "#thermite-????".into(),
            make_pipe: vec!["MODE {TARGET} +s".into()],
        },
    );
    let roles: Vec<Arc<dyn Role>> = vec![
        Arc::new(Ingest::new(core.clone(), transport)),
        Arc::new(Delivery::new(core, commands)),
    ];

    let (shutdown, shutdown_rx) = watch::channel(false);
    let (tx, rx) = mpsc::unbounded_channel();
    let tasks = vec![
        tokio::spawn(async move { handle.run(tx, shutdown_rx).await }),
        tokio::spawn(drive(rx, roles)),
    ];
    Relay {
        db,
        shutdown,
        tasks,
    }
}

async fn accept(listener: &TcpListener) -> Server {
    let (stream, _) = timeout(Duration::from_secs(5), listener.accept())
        .await
        .unwrap()
        .unwrap();
    Server {
        framed: Framed::new(stream, IrcCodec::default()),
    }
}

/// Complete registration and the admin channel join.
async fn register(server: &mut Server) {
    server.expect("CAP LS 302").await;
    server.expect("NICK relay").await;
    server.expect("USER relay 0 * relay").await;

    server.send(":srv CAP * LS :sasl").await;
    server.expect("CAP END").await;

    server.send(":srv 001 relay :Welcome").await;
    server
        .send(":srv 005 relay PREFIX=(ov)@+ CHANTYPES=# CASEMAPPING=rfc1459 :are supported")
        .await;
    server.send(":srv 376 relay :End of MOTD").await;
    server.expect(&format!("JOIN {ADMIN}")).await;

    server.send(&format!("{ME} JOIN {ADMIN}")).await;
    server
        .send(&format!(":srv 353 relay = {ADMIN} :relay @op!o@op.example"))
        .await;
}

#[tokio::test]
async fn pipe_buffer_flush_and_live_relay() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let relay = start_relay(port).await;
    let mut server = accept(&listener).await;
    register(&mut server).await;

    server.send("PING :keepalive").await;
    server.expect("PONG keepalive").await;

    // create a pipe from the admin channel
    server
        .send(&format!(":op!o@op.example PRIVMSG {ADMIN} :relay: pipe #src too noisy"))
        .await;
    let mode = server.wait_for(|l| l.starts_with("MODE #thermite-")).await;
    let target = mode.trim_start_matches("MODE ").to_string();
    server
        .send(&format!(":srv 403 relay {target} :No such channel"))
        .await;

    server.expect(&format!("JOIN {target}")).await;
    server.expect(&format!("MODE {target} +s")).await;
    server.expect("JOIN #src").await;
    server
        .expect(&format!("NOTICE {ADMIN} :piped #src to {target}"))
        .await;

    server.send(&format!("{ME} JOIN {target}")).await;
    server.send(&format!("{ME} JOIN #src")).await;
    server
        .send(":srv 353 relay = #src :relay alice!a@a.example")
        .await;

    // nobody reads the target yet, so this is only buffered
    server.send(":alice!a@a.example PRIVMSG #src :hello").await;
    server
        .send(":alice!a@a.example PRIVMSG #src :\x01ACTION waves\x01")
        .await;

    // first reader joins: backlog flushed in order
    server.send(&format!(":bob!b@b.example JOIN {target}")).await;
    server
        .expect(&format!("NOTICE {target} :- relay joined #src"))
        .await;
    server
        .expect(&format!("NOTICE {target} :<alice> hello"))
        .await;
    server
        .expect(&format!("NOTICE {target} :* alice waves"))
        .await;

    // with a reader present lines go out live
    server.send(":alice!a@a.example PRIVMSG #src :live").await;
    server.expect(&format!("NOTICE {target} :<alice> live")).await;

    // say from the target reaches the source
    server
        .send(&format!(":bob!b@b.example PRIVMSG {target} :relay say hi alice"))
        .await;
    server.expect("PRIVMSG #src :hi alice").await;

    // quit is relayed to the shared source
    server.send(":alice!a@a.example QUIT :gone").await;
    server
        .expect(&format!("NOTICE {target} :- alice quit (gone)"))
        .await;

    let stored = relay.db.get_pipe("#src").await.unwrap().unwrap();
    assert_eq!(stored.target, target);
    assert_eq!(stored.reason, "too noisy");

    relay.shutdown.send(true).unwrap();
    server.expect("QUIT :shutting down").await;
    for task in relay.tasks {
        timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn stored_pipes_are_rejoined_after_registration() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let relay = start_relay(port).await;
    relay
        .db
        .add_pipe("#kept", "#thermite-beef", "from last run")
        .await
        .unwrap();

    let mut server = accept(&listener).await;
    server.expect("CAP LS 302").await;
    server.send(":srv 001 relay :Welcome").await;
    server.send(":srv 422 relay :MOTD File is missing").await;

    server.expect("JOIN #kept").await;
    server.expect(&format!("JOIN {ADMIN}")).await;
    server.expect("JOIN #thermite-beef").await;

    server
        .send(":op!o@op.example PRIVMSG #thermite-beef :relay pipes")
        .await;
    server
        .expect("NOTICE #thermite-beef :#kept -> #thermite-beef")
        .await;

    relay.shutdown.send(true).unwrap();
    for task in relay.tasks {
        timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }
}
