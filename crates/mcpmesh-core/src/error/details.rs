//! Boxed error detail types to reduce `McpError` enum size.

use std::fmt;

use crate::types::CapabilityKind;

use super::transport::TransportErrorKind;

/// Type alias for boxed errors that are Send + Sync.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Where a handler failure originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorOrigin {
    /// The failing handler ran in this process.
    Local,
    /// The failure came back from a remote server through a proxy.
    Upstream,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Upstream => write!(f, "upstream"),
        }
    }
}

/// Details for argument validation failures.
#[derive(Debug)]
pub struct InvalidArgumentsDetails {
    /// Kind of capability whose schema rejected the arguments.
    pub kind: CapabilityKind,
    /// Name or identifier of the capability.
    pub name: String,
    /// Summary message.
    pub message: String,
    /// Individual validator messages, in validator order.
    pub errors: Vec<String>,
}

impl fmt::Display for InvalidArgumentsDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid arguments for {} '{}': {}",
            self.kind, self.name, self.message
        )
    }
}

impl std::error::Error for InvalidArgumentsDetails {}

/// Details for handler failures (boxed to reduce enum size).
#[derive(Debug)]
pub struct HandlerErrorDetails {
    /// Kind of capability whose handler failed.
    pub kind: CapabilityKind,
    /// Name or identifier of the capability. Empty until the registry fills it in.
    pub capability: String,
    /// Human-readable error message.
    pub message: String,
    /// Whether the failure happened here or upstream of a proxy.
    pub origin: ErrorOrigin,
    /// Messages raised explicitly for callers are never masked.
    pub public: bool,
    /// The underlying error, if available.
    pub source: Option<BoxError>,
}

impl fmt::Display for HandlerErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.origin {
            ErrorOrigin::Local => write!(f, "{} '{}' failed: {}", self.kind, self.capability, self.message),
            ErrorOrigin::Upstream => write!(
                f,
                "upstream {} '{}' failed: {}",
                self.kind, self.capability, self.message
            ),
        }
    }
}

impl std::error::Error for HandlerErrorDetails {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Details for transport errors (boxed to reduce enum size).
#[derive(Debug)]
pub struct TransportDetails {
    /// Classification of the transport error.
    pub kind: TransportErrorKind,
    /// Human-readable error message.
    pub message: String,
    /// The underlying error, if available.
    pub source: Option<BoxError>,
}

impl fmt::Display for TransportDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Transport error ({}): {}", self.kind, self.message)
    }
}

impl std::error::Error for TransportDetails {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}
