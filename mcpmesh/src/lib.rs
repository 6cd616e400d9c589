//! # mcpmesh - composable Model Context Protocol servers
//!
//! Build one MCP endpoint out of many: register tools, resources, resource
//! templates and prompts on a [`Server`], mount other servers under a
//! prefix, and bridge remote servers in through a [`ProxyBridge`].
//!
//! ## Features
//!
//! - **URI templates** with path captures, multi-segment wildcards and
//!   optional query parameters with defaults
//! - **Live or imported mounts**, with prefix-qualified names and URIs
//! - **Proxying** that relays remote progress and log notifications onto
//!   the caller's session
//! - **Cooperative cancellation** carried through every hop
//! - **Rich error handling** with miette diagnostics and error masking
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use mcpmesh::prelude::*;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let files = Arc::new(Server::new("files"));
//! files
//!     .add_template(
//!         ResourceTemplate::new("path://{filepath*}", "file"),
//!         |req, _session| async move {
//!             let path = req.param("filepath").unwrap_or_default().to_string();
//!             Ok(ResourceContents::text(req.uri, path))
//!         },
//!     )
//!     .unwrap();
//!
//! let root = Server::new("root");
//! root.mount("fs", files, MountMode::Live).await.unwrap();
//!
//! let session = SessionContext::new(1u64);
//! let contents = root.read_resource("path://fs/a/b/c", &session).await.unwrap();
//! assert_eq!(contents.text.as_deref(), Some("a/b/c"));
//! # });
//! ```
//!
//! ## Crate Organization
//!
//! - [`mcpmesh_core`] - Descriptors, errors and the URI template engine
//! - [`mod@mcpmesh_server`] - Registry, composition, proxying and sessions
//! - `mcpmesh_testing` - Fixtures, sinks and a scripted transport (feature `testing`)

#![warn(clippy::unwrap_used)]
#![allow(clippy::module_name_repetitions)]

pub use mcpmesh_core::*;

pub use mcpmesh_server::{
    CancellationToken, Provider, ProxyBridge, Registry, Server, ServerBuilder, SessionContext,
};

pub mod prelude;

/// Server module re-exports
pub mod server {
    //! Registry, composition and proxy types.
    pub use mcpmesh_server::*;
}

/// Testing utilities
#[cfg(feature = "testing")]
pub mod testing {
    //! Fixtures, sinks and mock transports.
    pub use mcpmesh_testing::*;
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_prelude_imports() {
        use crate::prelude::*;
        let _ = std::any::type_name::<McpError>();
        let _ = std::any::type_name::<Server>();
    }
}
