//! Unified error handling.
//!
//! All failures flow through [`McpError`]. The variants follow the lifecycle
//! of a capability:
//!
//! - **Registration** (`NameConflict`, `PrefixConflict`, `CyclicMount`,
//!   `InvalidTemplate`): the operation is rejected and the tree is unchanged.
//! - **Resolution** (`NotFound`, `ResourceConflict`): nothing, or more than one
//!   thing, answered to the requested name.
//! - **Invocation** (`InvalidArguments`, `Cancelled`, `Handler`): the handler
//!   was reached or deliberately skipped.
//!
//! Handler failures carry an [`ErrorOrigin`] so a caller can tell a local bug
//! from a remote server misbehaving behind a proxy.
//!
//! ```rust
//! use mcpmesh_core::error::{McpError, ErrorOrigin};
//! use mcpmesh_core::types::CapabilityKind;
//!
//! let err = McpError::handler(CapabilityKind::Tool, "divide", "division by zero");
//! assert_eq!(err.origin(), Some(ErrorOrigin::Local));
//! assert!(err.to_string().contains("divide"));
//! ```

pub mod codes;
mod details;
mod transport;
mod types;

pub use codes::*;
pub use details::{
    BoxError, ErrorOrigin, HandlerErrorDetails, InvalidArgumentsDetails, TransportDetails,
};
pub use transport::{TransportError, TransportErrorKind};
pub use types::McpError;
