//! RPC layer: framed messages and per-channel sessions
//!
//! Both ends of a channel speak the same protocol: requests carry an id
//! and are answered by exactly one response, notifications carry no id
//! and are never answered.

pub mod codec;
pub mod session;
pub mod types;

pub use session::{Inbound, Session};
pub use types::{ChannelId, Message, RpcError, Value};
