//! Testing utilities for mcpmesh.
//!
//! - [`sinks`]: a recording progress/log sink and a session wired to it
//! - [`mock`]: a scripted [`RemoteTransport`](mcpmesh_server::proxy::RemoteTransport)
//! - [`fixtures`]: small servers with tools, templates and prompts
//! - [`assertions`]: helpers for tool outputs and handler errors
//!
//! # Example
//!
//! ```rust
//! use mcpmesh_testing::{fixtures, recording_session};
//! use mcpmesh_server::provider::Provider;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let server = fixtures::weather_server();
//! let (session, sink) = recording_session(1u64);
//! let out = server
//!     .call_tool("get_forecast", json!({"city": "Oslo"}), &session)
//!     .await
//!     .unwrap();
//! assert!(out.first_text().unwrap().contains("Oslo"));
//! assert_eq!(sink.progress().len(), 2);
//! # });
//! ```

pub mod assertions;
pub mod fixtures;
pub mod mock;
pub mod sinks;

pub use assertions::{assert_handler_error, assert_tool_text};
pub use mock::MockTransport;
pub use sinks::{RecordingSink, recording_session};

use tracing_subscriber::EnvFilter;

/// Install a test-friendly tracing subscriber.
///
/// Honors `RUST_LOG`; safe to call from every test.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::assertions::{assert_handler_error, assert_tool_text};
    pub use crate::fixtures::{search_server, weather_server};
    pub use crate::init_tracing;
    pub use crate::mock::MockTransport;
    pub use crate::sinks::{RecordingSink, recording_session};
}
