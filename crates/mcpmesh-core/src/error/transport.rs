//! Transport error types.
//!
//! [`TransportError`] is what a remote transport collaborator reports. The
//! proxy bridge turns every one of them into an upstream handler failure.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of transport errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    /// Connection was closed or never established.
    ConnectionClosed,
    /// The round trip did not complete in time.
    Timeout,
    /// The peer answered with a JSON-RPC error object.
    Remote,
    /// Message format was invalid.
    InvalidMessage,
    /// The transport cannot perform the requested operation.
    Unsupported,
    /// Local I/O failed.
    Io,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionClosed => write!(f, "connection closed"),
            Self::Timeout => write!(f, "timeout"),
            Self::Remote => write!(f, "remote error"),
            Self::InvalidMessage => write!(f, "invalid message"),
            Self::Unsupported => write!(f, "unsupported"),
            Self::Io => write!(f, "i/o"),
        }
    }
}

/// Errors produced by a remote transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// I/O error from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The peer returned an error response.
    #[error("Remote error {code}: {message}")]
    Remote {
        /// JSON-RPC error code.
        code: i32,
        /// Error message as sent by the peer.
        message: String,
        /// Optional structured error data.
        data: Option<serde_json::Value>,
    },

    /// Invalid message format.
    #[error("Invalid message: {message}")]
    InvalidMessage {
        /// Description of the problem.
        message: String,
    },

    /// Timeout occurred.
    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// How long the operation waited.
        duration: std::time::Duration,
    },

    /// The transport does not support an operation.
    #[error("Operation not supported by transport: {operation}")]
    Unsupported {
        /// The operation that was attempted.
        operation: String,
    },
}

impl TransportError {
    /// Create a remote error from a JSON-RPC error code and message.
    pub fn remote(code: i32, message: impl Into<String>) -> Self {
        Self::Remote {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create an invalid message error.
    pub fn invalid_message(message: impl Into<String>) -> Self {
        Self::InvalidMessage {
            message: message.into(),
        }
    }

    /// Create an unsupported-operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Get the transport error kind.
    #[must_use]
    pub fn kind(&self) -> TransportErrorKind {
        match self {
            Self::Io(_) => TransportErrorKind::Io,
            Self::Json(_) | Self::InvalidMessage { .. } => TransportErrorKind::InvalidMessage,
            Self::ConnectionClosed => TransportErrorKind::ConnectionClosed,
            Self::Remote { .. } => TransportErrorKind::Remote,
            Self::Timeout { .. } => TransportErrorKind::Timeout,
            Self::Unsupported { .. } => TransportErrorKind::Unsupported,
        }
    }

    /// The remote JSON-RPC code, if the peer sent one.
    #[must_use]
    pub fn remote_code(&self) -> Option<i32> {
        match self {
            Self::Remote { code, .. } => Some(*code),
            _ => None,
        }
    }
}
