//! The provider abstraction shared by local servers and proxies.
//!
//! A mount edge points at an `Arc<dyn Provider>`; the composing server does
//! not care whether the child answers from its own registry, from a
//! snapshot, or from a remote process.

use std::fmt;

use async_trait::async_trait;
use mcpmesh_core::error::McpError;
use mcpmesh_core::types::{
    Capability, CapabilityList, GetPromptResult, Prompt, ResourceContents, Tool, ToolOutput,
};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::context::SessionContext;

/// Identity of a provider instance, used for cycle detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProviderId(Uuid);

impl ProviderId {
    /// A fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProviderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A resolved resource identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceMatch {
    /// The static resource or template that answered, keyed as seen by the caller.
    pub capability: Capability,
    /// Extracted template parameters. Empty for static resources.
    pub params: Map<String, Value>,
}

/// A call addressed to any capability kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// `tools/call`
    CallTool {
        /// Tool name.
        name: String,
        /// Arguments object.
        arguments: Value,
    },
    /// `resources/read`
    ReadResource {
        /// Resource identifier.
        uri: String,
    },
    /// `prompts/get`
    GetPrompt {
        /// Prompt name.
        name: String,
        /// Prompt arguments.
        arguments: Map<String, Value>,
    },
}

/// The result of an [`Invocation`].
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationOutput {
    /// A tool result.
    Tool(ToolOutput),
    /// Resource contents.
    Resource(ResourceContents),
    /// A rendered prompt.
    Prompt(GetPromptResult),
}

/// Something that exposes capabilities: a server node or a proxy.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Instance identity.
    fn id(&self) -> ProviderId;

    /// Human-readable name, for logs.
    fn name(&self) -> &str;

    /// Whether `id` is reachable through this provider's mount edges.
    fn reaches(&self, _id: ProviderId) -> bool {
        false
    }

    /// Full descriptors of every visible capability, keyed as seen by a caller.
    async fn capabilities(&self) -> Result<Vec<Capability>, McpError>;

    /// Resolve a tool name.
    async fn lookup_tool(&self, name: &str) -> Result<Tool, McpError>;

    /// Resolve a prompt name.
    async fn lookup_prompt(&self, name: &str) -> Result<Prompt, McpError>;

    /// Resolve a resource identifier.
    async fn lookup_resource(&self, uri: &str) -> Result<ResourceMatch, McpError>;

    /// Call a tool.
    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        session: &SessionContext,
    ) -> Result<ToolOutput, McpError>;

    /// Read a resource.
    async fn read_resource(
        &self,
        uri: &str,
        session: &SessionContext,
    ) -> Result<ResourceContents, McpError>;

    /// Render a prompt.
    async fn get_prompt(
        &self,
        name: &str,
        arguments: Map<String, Value>,
        session: &SessionContext,
    ) -> Result<GetPromptResult, McpError>;

    /// A restartable listing of every visible capability.
    async fn list(&self) -> Result<CapabilityList, McpError> {
        Ok(CapabilityList::from(self.capabilities().await?))
    }

    /// Dispatch an invocation of any kind.
    async fn invoke(
        &self,
        invocation: Invocation,
        session: &SessionContext,
    ) -> Result<InvocationOutput, McpError> {
        match invocation {
            Invocation::CallTool { name, arguments } => self
                .call_tool(&name, arguments, session)
                .await
                .map(InvocationOutput::Tool),
            Invocation::ReadResource { uri } => self
                .read_resource(&uri, session)
                .await
                .map(InvocationOutput::Resource),
            Invocation::GetPrompt { name, arguments } => self
                .get_prompt(&name, arguments, session)
                .await
                .map(InvocationOutput::Prompt),
        }
    }
}

impl fmt::Debug for dyn Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("id", &self.id())
            .field("name", &self.name())
            .finish()
    }
}
