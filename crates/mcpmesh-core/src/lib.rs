//! Core types for composing Model Context Protocol servers.
//!
//! This crate is runtime-agnostic. It provides:
//!
//! - [`error`]: the unified [`McpError`](error::McpError) taxonomy
//! - [`types`]: tool, resource, template and prompt descriptors
//! - [`template`]: the URI template engine used to resolve resource identifiers
//! - [`validation`]: the schema validator collaborator
//! - [`protocol`]: request and progress identifiers

pub mod error;
pub mod protocol;
pub mod template;
pub mod types;
pub mod validation;

pub use error::McpError;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{ErrorOrigin, McpError, TransportError};
    pub use crate::protocol::{ProgressToken, RequestId};
    pub use crate::template::{QueryPolicy, TemplateMatch, UriTemplate};
    pub use crate::types::{
        Annotations, Capability, CapabilityKind, CapabilityList, CapabilitySummary, Content,
        GetPromptResult, Prompt, PromptArgument, PromptMessage, Resource, ResourceContents,
        ResourceTemplate, Role, Tool, ToolOutput,
    };
    pub use crate::validation::{CompiledSchema, JsonSchemaValidator, SchemaValidator};
}
