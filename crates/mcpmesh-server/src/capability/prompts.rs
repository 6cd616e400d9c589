//! Prompt entries.

use std::future::Future;
use std::sync::Arc;

use mcpmesh_core::error::McpError;
use mcpmesh_core::types::{GetPromptResult, Prompt};
use mcpmesh_core::validation::{CompiledSchema, SchemaValidator};
use serde_json::{Map, Value};

use super::HandlerFuture;
use crate::context::SessionContext;

/// A shared async function for prompt rendering.
pub type BoxedPromptFn = Arc<
    dyn Fn(Map<String, Value>, SessionContext) -> HandlerFuture<GetPromptResult> + Send + Sync,
>;

/// A registered prompt with metadata and handler.
#[derive(Clone)]
pub struct RegisteredPrompt {
    /// Prompt metadata.
    pub prompt: Prompt,
    schema: Value,
    handler: BoxedPromptFn,
    compiled: Option<Arc<dyn CompiledSchema>>,
}

impl RegisteredPrompt {
    /// Pair a descriptor with a handler.
    pub fn new<F, Fut>(prompt: Prompt, handler: F) -> Self
    where
        F: Fn(Map<String, Value>, SessionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<GetPromptResult, McpError>> + Send + 'static,
    {
        let schema = prompt.arguments_schema();
        Self {
            prompt,
            schema,
            handler: Arc::new(move |args, session| -> HandlerFuture<GetPromptResult> {
                Box::pin(handler(args, session))
            }),
            compiled: None,
        }
    }

    /// The schema derived from the declared arguments.
    #[must_use]
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    pub(crate) fn compile_schema(&mut self, validator: &dyn SchemaValidator) {
        self.compiled = Some(validator.compile(&self.schema));
    }

    pub(crate) fn compiled_schema(&self) -> Option<&dyn CompiledSchema> {
        self.compiled.as_deref()
    }

    /// Run the handler.
    pub fn call(
        &self,
        arguments: Map<String, Value>,
        session: SessionContext,
    ) -> HandlerFuture<GetPromptResult> {
        (self.handler)(arguments, session)
    }
}

impl std::fmt::Debug for RegisteredPrompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredPrompt")
            .field("prompt", &self.prompt.name)
            .finish_non_exhaustive()
    }
}
