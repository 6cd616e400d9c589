//! The primary error type.

use miette::Diagnostic;
use thiserror::Error;

use crate::types::CapabilityKind;

use super::codes;
use super::details::{
    BoxError, ErrorOrigin, HandlerErrorDetails, InvalidArgumentsDetails, TransportDetails,
};
use super::transport::TransportError;

/// The primary error type for registry, composition and proxy operations.
///
/// Large error variants are boxed to keep `Result<T, McpError>` small.
#[derive(Error, Diagnostic, Debug)]
pub enum McpError {
    // ========================================================================
    // Resolution
    // ========================================================================
    /// No capability matched the requested name or identifier.
    #[error("{kind} not found: {name}")]
    #[diagnostic(
        code(mcpmesh::resolve::not_found),
        help("Names of mounted capabilities carry their mount prefix")
    )]
    NotFound {
        /// Which kind of capability was looked up.
        kind: CapabilityKind,
        /// The name or identifier that did not resolve.
        name: String,
    },

    /// No mount exists under the given prefix.
    #[error("No provider mounted at '{prefix}'")]
    #[diagnostic(code(mcpmesh::mount::not_found))]
    MountNotFound {
        /// The prefix that was looked up.
        prefix: String,
    },

    /// Two resource candidates matched the same identifier at call time.
    #[error("Resource '{uri}' is ambiguous between {candidates:?}")]
    #[diagnostic(code(mcpmesh::resolve::resource_conflict))]
    ResourceConflict {
        /// The identifier that was read.
        uri: String,
        /// The matching candidates, qualified.
        candidates: Box<[String]>,
    },

    // ========================================================================
    // Registration
    // ========================================================================
    /// A capability with the same key already exists, or a template ties with one.
    #[error("{kind} '{name}' conflicts with an existing registration: {reason}")]
    #[diagnostic(code(mcpmesh::register::name_conflict))]
    NameConflict {
        /// Which kind of capability was registered.
        kind: CapabilityKind,
        /// The conflicting key.
        name: String,
        /// What it conflicts with.
        reason: String,
    },

    /// A mount prefix collides with one already mounted.
    #[error("Mount prefix '{prefix}' conflicts with existing prefix '{existing}'")]
    #[diagnostic(
        code(mcpmesh::mount::prefix_conflict),
        help("Prefixes must not be string prefixes of one another")
    )]
    PrefixConflict {
        /// The prefix being mounted.
        prefix: String,
        /// The prefix already in the mount table.
        existing: String,
    },

    /// Mounting would create a cycle in the server graph.
    #[error("Mounting '{prefix}' would create a cycle")]
    #[diagnostic(code(mcpmesh::mount::cyclic))]
    CyclicMount {
        /// The prefix being mounted.
        prefix: String,
    },

    /// A URI template failed to parse.
    #[error("Invalid URI template '{template}': {reason}")]
    #[diagnostic(code(mcpmesh::template::invalid))]
    InvalidTemplate {
        /// The template text.
        template: String,
        /// Why it was rejected.
        reason: String,
    },

    // ========================================================================
    // Invocation
    // ========================================================================
    /// Arguments failed schema validation (details boxed to reduce enum size).
    #[error("{0}")]
    #[diagnostic(code(mcpmesh::invoke::invalid_arguments))]
    InvalidArguments(#[source] Box<InvalidArgumentsDetails>),

    /// The session was cancelled before a result was produced.
    #[error("Operation cancelled: {operation}{}", reason.as_deref().map(|r| format!(" ({r})")).unwrap_or_default())]
    #[diagnostic(code(mcpmesh::invoke::cancelled))]
    Cancelled {
        /// The operation that was cancelled.
        operation: String,
        /// Reason for cancellation, if provided.
        reason: Option<String>,
    },

    /// A capability handler failed (details boxed to reduce enum size).
    #[error("{0}")]
    #[diagnostic(code(mcpmesh::invoke::handler))]
    Handler(#[source] Box<HandlerErrorDetails>),

    // ========================================================================
    // Transport and protocol
    // ========================================================================
    /// Transport-level error (details boxed to reduce enum size).
    #[error("Transport error ({}): {}", .0.kind, .0.message)]
    #[diagnostic(code(mcpmesh::transport::error))]
    Transport(#[source] Box<TransportDetails>),

    /// The method does not exist or is not available.
    #[error("Method not found: {method}")]
    #[diagnostic(code(mcpmesh::protocol::method_not_found))]
    MethodNotFound {
        /// The method that was requested.
        method: String,
    },

    /// Request parameters did not have the expected shape.
    #[error("Invalid request: {message}")]
    #[diagnostic(code(mcpmesh::protocol::invalid_request))]
    InvalidRequest {
        /// Human-readable error message.
        message: String,
    },

    /// Unexpected internal state.
    #[error("Internal error: {message}")]
    #[diagnostic(code(mcpmesh::internal), severity(error))]
    Internal {
        /// Human-readable error message.
        message: String,
        /// The underlying error, if available.
        #[source]
        source: Option<BoxError>,
    },
}

// ============================================================================
// Error Construction Helpers
// ============================================================================

impl McpError {
    /// Create a not-found error.
    pub fn not_found(kind: CapabilityKind, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Create a tool not found error.
    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Self::not_found(CapabilityKind::Tool, name)
    }

    /// Create a resource not found error.
    pub fn resource_not_found(uri: impl Into<String>) -> Self {
        Self::not_found(CapabilityKind::Resource, uri)
    }

    /// Create a prompt not found error.
    pub fn prompt_not_found(name: impl Into<String>) -> Self {
        Self::not_found(CapabilityKind::Prompt, name)
    }

    /// Create a mount not found error.
    pub fn mount_not_found(prefix: impl Into<String>) -> Self {
        Self::MountNotFound {
            prefix: prefix.into(),
        }
    }

    /// Create a name conflict error.
    pub fn name_conflict(
        kind: CapabilityKind,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::NameConflict {
            kind,
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a prefix conflict error.
    pub fn prefix_conflict(prefix: impl Into<String>, existing: impl Into<String>) -> Self {
        Self::PrefixConflict {
            prefix: prefix.into(),
            existing: existing.into(),
        }
    }

    /// Create a cyclic mount error.
    pub fn cyclic_mount(prefix: impl Into<String>) -> Self {
        Self::CyclicMount {
            prefix: prefix.into(),
        }
    }

    /// Create an invalid template error.
    pub fn invalid_template(template: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTemplate {
            template: template.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid arguments error.
    pub fn invalid_arguments(
        kind: CapabilityKind,
        name: impl Into<String>,
        message: impl Into<String>,
        errors: Vec<String>,
    ) -> Self {
        Self::InvalidArguments(Box::new(InvalidArgumentsDetails {
            kind,
            name: name.into(),
            message: message.into(),
            errors,
        }))
    }

    /// Create a cancelled error.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
            reason: None,
        }
    }

    /// Create a cancelled error with reason.
    pub fn cancelled_with_reason(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
            reason: Some(reason.into()),
        }
    }

    /// An error message a handler wants callers to see verbatim.
    ///
    /// These are never masked by `mask_error_details`.
    pub fn tool_error(message: impl Into<String>) -> Self {
        Self::Handler(Box::new(HandlerErrorDetails {
            kind: CapabilityKind::Tool,
            capability: String::new(),
            message: message.into(),
            origin: ErrorOrigin::Local,
            public: true,
            source: None,
        }))
    }

    /// Wrap an arbitrary failure raised while running a capability handler.
    pub fn handler<E>(kind: CapabilityKind, capability: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        let source = source.into();
        Self::Handler(Box::new(HandlerErrorDetails {
            kind,
            capability: capability.into(),
            message: source.to_string(),
            origin: ErrorOrigin::Local,
            public: false,
            source: Some(source),
        }))
    }

    /// A forwarding failure reported by a remote transport.
    pub fn upstream(
        kind: CapabilityKind,
        capability: impl Into<String>,
        source: TransportError,
    ) -> Self {
        Self::Handler(Box::new(HandlerErrorDetails {
            kind,
            capability: capability.into(),
            message: source.to_string(),
            origin: ErrorOrigin::Upstream,
            public: false,
            source: Some(Box::new(source)),
        }))
    }

    /// Create a resource conflict error.
    pub fn resource_conflict(uri: impl Into<String>, candidates: Vec<String>) -> Self {
        Self::ResourceConflict {
            uri: uri.into(),
            candidates: candidates.into_boxed_slice(),
        }
    }

    /// Create a method not found error.
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::MethodNotFound {
            method: method.into(),
        }
    }

    /// Create an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Create an internal error with a source.
    pub fn internal_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get the JSON-RPC error code for this error.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::NotFound { .. } | Self::MountNotFound { .. } => codes::RESOURCE_NOT_FOUND,
            Self::ResourceConflict { .. } => codes::RESOURCE_CONFLICT,
            Self::NameConflict { .. }
            | Self::PrefixConflict { .. }
            | Self::CyclicMount { .. }
            | Self::InvalidTemplate { .. } => codes::REGISTRATION_CONFLICT,
            Self::InvalidArguments(_) => codes::INVALID_PARAMS,
            Self::Cancelled { .. } => codes::REQUEST_CANCELLED,
            Self::Handler(_) => codes::HANDLER_ERROR,
            Self::Transport(_) => codes::TRANSPORT_ERROR,
            Self::MethodNotFound { .. } => codes::METHOD_NOT_FOUND,
            Self::InvalidRequest { .. } => codes::INVALID_REQUEST,
            Self::Internal { .. } => codes::INTERNAL_ERROR,
        }
    }

    /// Registration-time errors: the operation was rejected and nothing changed.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::NameConflict { .. }
                | Self::PrefixConflict { .. }
                | Self::CyclicMount { .. }
                | Self::InvalidTemplate { .. }
        )
    }

    /// Whether this error is a resolution miss.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::MountNotFound { .. })
    }

    /// Whether this error reports cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Handler failure details, if this is a handler error.
    #[must_use]
    pub fn handler_details(&self) -> Option<&HandlerErrorDetails> {
        match self {
            Self::Handler(details) => Some(details),
            _ => None,
        }
    }

    /// Where a handler failure originated, if this is one.
    #[must_use]
    pub fn origin(&self) -> Option<ErrorOrigin> {
        self.handler_details().map(|d| d.origin)
    }
}

// ============================================================================
// Standard Error Conversions
// ============================================================================

impl From<TransportError> for McpError {
    fn from(err: TransportError) -> Self {
        Self::Transport(Box::new(TransportDetails {
            kind: err.kind(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        }))
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal_with_source("JSON serialization/deserialization error", err)
    }
}
