//! Registered capability entries: a descriptor plus its handler.
//!
//! Handlers receive owned arguments and an owned [`SessionContext`] clone,
//! so a call can outlive the lock it was resolved under and can be
//! forwarded across mounts.
//!
//! [`SessionContext`]: crate::context::SessionContext

pub mod prompts;
pub mod resources;
pub mod tools;

use futures::future::BoxFuture;
use mcpmesh_core::error::McpError;

pub use prompts::{BoxedPromptFn, RegisteredPrompt};
pub use resources::{BoxedResourceFn, RegisteredResource, RegisteredTemplate, ResourceRequest};
pub use tools::{BoxedToolFn, RegisteredTool};

/// The future every capability handler returns.
pub type HandlerFuture<T> = BoxFuture<'static, Result<T, McpError>>;

/// Any registrable entry.
#[derive(Debug, Clone)]
pub enum Registration {
    /// A tool.
    Tool(RegisteredTool),
    /// A static resource.
    Resource(RegisteredResource),
    /// A resource template.
    Template(RegisteredTemplate),
    /// A prompt.
    Prompt(RegisteredPrompt),
}

impl From<RegisteredTool> for Registration {
    fn from(entry: RegisteredTool) -> Self {
        Self::Tool(entry)
    }
}

impl From<RegisteredResource> for Registration {
    fn from(entry: RegisteredResource) -> Self {
        Self::Resource(entry)
    }
}

impl From<RegisteredTemplate> for Registration {
    fn from(entry: RegisteredTemplate) -> Self {
        Self::Template(entry)
    }
}

impl From<RegisteredPrompt> for Registration {
    fn from(entry: RegisteredPrompt) -> Self {
        Self::Prompt(entry)
    }
}
