//! IRC client plumbing: framing, parsing, state tracking and connections.

pub mod casemap;
pub mod codec;
pub mod connection;
pub mod message;
pub mod state;
pub mod tls;

pub use casemap::CaseMapping;
pub use connection::{Inbound, IrcHandle, ReconnectPolicy};
pub use message::{Hostmask, Line};
pub use state::{Occupant, ServerState};
