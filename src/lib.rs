//! embedhost - remote UI embedding for an editor core
//!
//! This library provides the byte channels, RPC sessions and attach
//! protocol that let external UIs drive an editor host.

pub mod channel;
pub mod cli;
pub mod commands;
pub mod common;
pub mod host;
pub mod rpc;
pub mod transport;

// Re-export commonly used types for tests
pub use channel::{AttachState, ChannelManager};
pub use common::{Error, Result};
pub use rpc::{ChannelId, Session, Value};
