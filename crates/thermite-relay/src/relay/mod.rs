//! The relay engine: formatting, routing and the two connection roles.

pub mod delivery;
pub mod format;
pub mod ingest;
pub mod presence;
pub mod routing;
pub mod session;
pub mod split;

pub use delivery::Delivery;
pub use format::ChannelEvent;
pub use ingest::Ingest;
pub use presence::{Presence, PresenceOracle};
pub use routing::{RelayCore, Routed};
pub use session::{Role, RoleError, drive};
