//! Error types for the embedding host
//!
//! Transport and decode failures are fatal to a single channel only.
//! Attach and per-request failures travel back to the peer as ordinary
//! error responses (see [`RpcError`]).

use std::io;
use thiserror::Error;

use crate::rpc::types::ChannelId;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the embedding host
#[derive(Error, Debug)]
pub enum Error {
    // === Transport Errors ===
    #[error("Failed to spawn '{program}': {reason}")]
    Spawn { program: String, reason: String },

    #[error("Cannot listen on '{address}': {reason}")]
    Bind { address: String, reason: String },

    #[error("Cannot connect to '{address}': {reason}")]
    Connect { address: String, reason: String },

    #[error("Timed out after {0} seconds waiting for the address to become connectable")]
    Timeout(u64),

    // === Protocol Errors ===
    #[error("Malformed frame: {0}")]
    Decode(String),

    #[error("Channel {0} is closed")]
    ChannelClosed(ChannelId),

    #[error("Channel {0} does not exist")]
    ChannelNotFound(ChannelId),

    #[error("Attach failed: {0}")]
    Attach(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Remote error {code}: {message}")]
    Remote { code: String, message: String },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a spawn error for a program
    pub fn spawn_failed(program: &str, reason: impl ToString) -> Self {
        Self::Spawn {
            program: program.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a bind error for an address
    pub fn bind_failed(address: &str, reason: impl ToString) -> Self {
        Self::Bind {
            address: address.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a connect error for an address
    pub fn connect_failed(address: &str, reason: impl ToString) -> Self {
        Self::Connect {
            address: address.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create an invalid arguments error
    pub fn invalid_args(message: impl Into<String>) -> Self {
        Self::InvalidArgs(message.into())
    }

    /// Create an attach error
    pub fn attach(message: impl Into<String>) -> Self {
        Self::Attach(message.into())
    }
}

/// Wire form of an error result
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RpcError {
    pub code: String,
    pub message: String,
}

impl RpcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl From<&Error> for RpcError {
    fn from(e: &Error) -> Self {
        // Known kinds carry their bare detail so the peer can rebuild them
        match e {
            Error::MethodNotFound(method) => Self::new("METHOD_NOT_FOUND", method.clone()),
            Error::InvalidArgs(message) => Self::new("INVALID_ARGS", message.clone()),
            Error::Attach(message) => Self::new("ATTACH_ERROR", message.clone()),
            Error::ChannelClosed(_) => Self::new("CHANNEL_CLOSED", e.to_string()),
            Error::ChannelNotFound(_) => Self::new("CHANNEL_NOT_FOUND", e.to_string()),
            Error::Remote { code, message } => Self::new(code, message.clone()),
            _ => Self::new("INTERNAL_ERROR", e.to_string()),
        }
    }
}

impl From<RpcError> for Error {
    fn from(e: RpcError) -> Self {
        match e.code.as_str() {
            "METHOD_NOT_FOUND" => Error::MethodNotFound(e.message),
            "INVALID_ARGS" => Error::InvalidArgs(e.message),
            "ATTACH_ERROR" => Error::Attach(e.message),
            _ => Error::Remote {
                code: e.code,
                message: e.message,
            },
        }
    }
}
