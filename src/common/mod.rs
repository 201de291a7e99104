//! Common utilities shared between host and client modes

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result, RpcError};
