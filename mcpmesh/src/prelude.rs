//! Prelude module for convenient imports.
//!
//! ```rust
//! use mcpmesh::prelude::*;
//!
//! let server = Server::new("demo");
//! server
//!     .add_tool(Tool::new("ping"), |_args, _session| async move {
//!         Ok(ToolOutput::text("pong"))
//!     })
//!     .unwrap();
//! assert!(server.registry().contains(CapabilityKind::Tool, "ping"));
//! ```
//!
//! ## Included Types
//!
//! - Descriptors (`Tool`, `Resource`, `ResourceTemplate`, `Prompt`) and results
//! - Errors (`McpError`, `TransportError`, `ErrorOrigin`)
//! - The URI template engine (`UriTemplate`, `QueryPolicy`)
//! - Nodes (`Server`, `Registry`, `ProxyBridge`) and the `Provider` trait
//! - Sessions, sinks and configuration

// Core types
pub use mcpmesh_core::prelude::*;

// Server types
pub use mcpmesh_server::prelude::*;
