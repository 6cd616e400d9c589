//! Capability registry, composition and proxying for mcpmesh.
//!
//! # Overview
//!
//! - [`registry::Registry`] stores one node's tools, resources, templates
//!   and prompts, validates arguments and runs handlers
//! - [`server::Server`] wraps a registry with a mount table; mounting one
//!   server under another namespaces the child's capabilities by prefix
//! - [`proxy::ProxyBridge`] exposes a remote provider as a local one,
//!   relaying its progress and log notifications
//! - [`context::SessionContext`] carries per-call identity, cancellation
//!   and notification sinks through every hop
//!
//! All three node kinds implement [`provider::Provider`], which is what a
//! wire layer calls through [`router::dispatch`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use mcpmesh_server::prelude::*;
//! use mcpmesh_core::prelude::*;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let math = Arc::new(Server::new("math"));
//! math.add_tool(
//!     Tool::new("add").with_number_param("a", "", true).with_number_param("b", "", true),
//!     |args, _session| async move {
//!         let sum = args["a"].as_f64().unwrap_or(0.0) + args["b"].as_f64().unwrap_or(0.0);
//!         Ok(ToolOutput::text(sum.to_string()))
//!     },
//! )
//! .unwrap();
//!
//! let root = Server::new("root");
//! root.mount("math", math, MountMode::Live).await.unwrap();
//!
//! let session = SessionContext::new(1u64);
//! let out = root.call_tool("math_add", json!({"a": 2, "b": 3}), &session).await.unwrap();
//! assert_eq!(out.first_text(), Some("5"));
//! # });
//! ```

pub mod capability;
pub mod compose;
pub mod config;
pub mod context;
pub mod provider;
pub mod proxy;
pub mod registry;
pub mod router;
pub mod server;
pub mod sink;

pub use context::{CancellationToken, SessionContext};
pub use provider::Provider;
pub use proxy::ProxyBridge;
pub use registry::Registry;
pub use server::{Server, ServerBuilder};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::capability::{
        RegisteredPrompt, RegisteredResource, RegisteredTemplate, RegisteredTool, Registration,
        ResourceRequest,
    };
    pub use crate::compose::MountMode;
    pub use crate::config::{
        CachePolicy, DuplicatePolicy, ProxyConfig, ResourcePrefixFormat, ServerConfig,
    };
    pub use crate::context::{CancellationToken, SessionBuilder, SessionContext, SubCall};
    pub use crate::provider::{Invocation, InvocationOutput, Provider, ProviderId, ResourceMatch};
    pub use crate::proxy::{
        LoopbackTransport, ProxyBridge, RemoteEvent, RemoteEventKind, RemoteRequest,
        RemoteTransport,
    };
    pub use crate::registry::Registry;
    pub use crate::server::{Server, ServerBuilder};
    pub use crate::sink::{
        ChannelSink, LogLevel, LogRecord, LogSink, NoOpSink, ProgressSink, ProgressUpdate,
        SessionEvent, TracingSink,
    };
}
