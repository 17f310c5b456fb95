//! Source/target pipe mapping.

pub mod pipes;

pub use pipes::{Pipe, PipeRegistry, RegistryError};
