//! Error types for antibrute-core

use crate::types::ErrorKind;
use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum CoreError {
    // Validation errors: surfaced to the caller as-is, no state mutated
    #[error("Invalid ip `{ip}`: {reason}")]
    InvalidIp { ip: String, reason: String },

    #[error("ip `{0}` must not include a mask")]
    MaskNotAllowed(String),

    #[error("{0} is required")]
    MissingField(&'static str),

    // Fatal at startup
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Backend failures (durable list/bucket implementations)
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] postcard::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Protocol version mismatch: expected {expected}, got {got}")]
    ProtocolVersionMismatch { expected: u32, got: u32 },

    #[error("Invalid handshake message")]
    InvalidHandshake,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Error reported by the remote end of a request
    #[error("{kind:?} error from server: {message}")]
    Remote { kind: ErrorKind, message: String },

    #[error("Certificate parse error: {0}")]
    CertParseError(String),

    #[error("No data directory found")]
    NoDataDir,
}

impl CoreError {
    /// Wire-level classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::InvalidIp { .. }
            | CoreError::MaskNotAllowed(_)
            | CoreError::MissingField(_) => ErrorKind::Validation,
            CoreError::Storage(_) => ErrorKind::Storage,
            CoreError::Remote { kind, .. } => *kind,
            _ => ErrorKind::Internal,
        }
    }

    pub(crate) fn invalid_ip(ip: &str, reason: impl ToString) -> Self {
        CoreError::InvalidIp {
            ip: ip.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, CoreError>;

impl From<quinn::ConnectionError> for CoreError {
    fn from(err: quinn::ConnectionError) -> Self {
        CoreError::Connection(err.to_string())
    }
}

impl From<quinn::ConnectError> for CoreError {
    fn from(err: quinn::ConnectError) -> Self {
        CoreError::Connection(err.to_string())
    }
}

impl From<quinn::WriteError> for CoreError {
    fn from(err: quinn::WriteError) -> Self {
        CoreError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, err))
    }
}

impl From<quinn::ReadExactError> for CoreError {
    fn from(err: quinn::ReadExactError) -> Self {
        CoreError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, err))
    }
}
