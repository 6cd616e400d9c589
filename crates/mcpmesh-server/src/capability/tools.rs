//! Tool entries.

use std::future::Future;
use std::sync::Arc;

use mcpmesh_core::error::McpError;
use mcpmesh_core::types::{Tool, ToolOutput};
use mcpmesh_core::validation::{CompiledSchema, SchemaValidator};
use serde_json::Value;

use super::HandlerFuture;
use crate::context::SessionContext;

/// A shared async function for tool execution.
pub type BoxedToolFn = Arc<dyn Fn(Value, SessionContext) -> HandlerFuture<ToolOutput> + Send + Sync>;

/// A registered tool with metadata and handler.
#[derive(Clone)]
pub struct RegisteredTool {
    /// Tool metadata.
    pub tool: Tool,
    handler: BoxedToolFn,
    compiled: Option<Arc<dyn CompiledSchema>>,
}

impl RegisteredTool {
    /// Pair a descriptor with a handler.
    pub fn new<F, Fut>(tool: Tool, handler: F) -> Self
    where
        F: Fn(Value, SessionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput, McpError>> + Send + 'static,
    {
        Self {
            tool,
            handler: Arc::new(move |args, session| -> HandlerFuture<ToolOutput> {
                Box::pin(handler(args, session))
            }),
            compiled: None,
        }
    }

    /// Pair a descriptor with an already-boxed handler.
    #[must_use]
    pub fn from_boxed(tool: Tool, handler: BoxedToolFn) -> Self {
        Self {
            tool,
            handler,
            compiled: None,
        }
    }

    pub(crate) fn compile_schema(&mut self, validator: &dyn SchemaValidator) {
        self.compiled = Some(validator.compile(&self.tool.input_schema));
    }

    /// The input schema as compiled at registration.
    pub(crate) fn compiled_schema(&self) -> Option<&dyn CompiledSchema> {
        self.compiled.as_deref()
    }

    /// Run the handler. Arguments are expected to be validated already.
    pub fn call(&self, arguments: Value, session: SessionContext) -> HandlerFuture<ToolOutput> {
        (self.handler)(arguments, session)
    }
}

impl std::fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("tool", &self.tool.name)
            .finish_non_exhaustive()
    }
}
