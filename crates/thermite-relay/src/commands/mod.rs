//! In-channel command language.

pub mod dispatcher;
pub mod parser;

pub use dispatcher::{CommandDispatcher, CommandError, PipeSettings};
pub use parser::{Command, parse_highlight};
