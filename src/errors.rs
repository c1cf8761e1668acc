//! Error types shared across the application.

use std::fmt::{Display, Formatter};

use crate::rpc::message::RpcError;

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// A line could not be decoded into, or encoded from, a JSON-RPC message.
    Codec(String),
    /// An inbound message violated protocol expectations.
    Protocol(String),
    /// An outbound request could not be handed to the stream writer.
    SendFailed(String),
    /// No reply arrived for the given request id before its deadline.
    Timeout(i64),
    /// The router stopped (stream closed) while the request was in flight.
    RouterStopped,
    /// The host answered an outbound request with a JSON-RPC error object.
    Remote(RpcError),
    /// The negotiated client capabilities do not include the named capability.
    Unsupported(String),
    /// A path parameter failed validation (must be absolute).
    InvalidPath(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Codec(msg) => write!(f, "codec: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::SendFailed(msg) => write!(f, "send failed: {msg}"),
            Self::Timeout(id) => write!(f, "timeout: no reply for request id {id}"),
            Self::RouterStopped => write!(f, "router stopped: stream closed"),
            Self::Remote(err) => write!(f, "remote error {}: {}", err.code, err.message),
            Self::Unsupported(cap) => write!(f, "unsupported capability: {cap}"),
            Self::InvalidPath(path) => write!(f, "invalid path: {path} is not absolute"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
