//! Static resource and resource template entries.

use std::future::Future;
use std::sync::Arc;

use mcpmesh_core::error::McpError;
use mcpmesh_core::template::UriTemplate;
use mcpmesh_core::types::{Resource, ResourceContents, ResourceTemplate};
use mcpmesh_core::validation::{CompiledSchema, SchemaValidator};
use serde_json::{Map, Value};

use super::HandlerFuture;
use crate::context::SessionContext;

/// What a resource handler is asked to read.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRequest {
    /// The identifier as requested, in the handler's own namespace.
    pub uri: String,
    /// Template parameters, after defaults and validation. Empty for static resources.
    pub params: Map<String, Value>,
}

impl ResourceRequest {
    /// A string parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(Value::as_str)
    }
}

/// A shared async function for resource reads.
pub type BoxedResourceFn =
    Arc<dyn Fn(ResourceRequest, SessionContext) -> HandlerFuture<ResourceContents> + Send + Sync>;

fn boxed<F, Fut>(handler: F) -> BoxedResourceFn
where
    F: Fn(ResourceRequest, SessionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ResourceContents, McpError>> + Send + 'static,
{
    Arc::new(move |request, session| -> HandlerFuture<ResourceContents> {
        Box::pin(handler(request, session))
    })
}

/// A registered static resource.
#[derive(Clone)]
pub struct RegisteredResource {
    /// Resource metadata.
    pub resource: Resource,
    handler: BoxedResourceFn,
}

impl RegisteredResource {
    /// Pair a descriptor with a handler.
    ///
    /// Static identifiers may not contain template expressions.
    pub fn new<F, Fut>(resource: Resource, handler: F) -> Result<Self, McpError>
    where
        F: Fn(ResourceRequest, SessionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ResourceContents, McpError>> + Send + 'static,
    {
        if UriTemplate::is_template(&resource.uri) {
            return Err(McpError::invalid_template(
                &resource.uri,
                "static resource identifiers cannot contain expressions",
            ));
        }
        Ok(Self {
            resource,
            handler: boxed(handler),
        })
    }

    /// Run the handler.
    pub fn call(
        &self,
        request: ResourceRequest,
        session: SessionContext,
    ) -> HandlerFuture<ResourceContents> {
        (self.handler)(request, session)
    }
}

impl std::fmt::Debug for RegisteredResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredResource")
            .field("uri", &self.resource.uri)
            .finish_non_exhaustive()
    }
}

/// A registered resource template with its parsed pattern.
#[derive(Clone)]
pub struct RegisteredTemplate {
    /// Template metadata.
    pub template: ResourceTemplate,
    pattern: UriTemplate,
    handler: BoxedResourceFn,
    compiled: Option<Arc<dyn CompiledSchema>>,
}

impl RegisteredTemplate {
    /// Parse the template and pair it with a handler.
    pub fn new<F, Fut>(template: ResourceTemplate, handler: F) -> Result<Self, McpError>
    where
        F: Fn(ResourceRequest, SessionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ResourceContents, McpError>> + Send + 'static,
    {
        let pattern =
            UriTemplate::parse(&template.uri_template)?.with_defaults(template.defaults.clone())?;
        Ok(Self {
            template,
            pattern,
            handler: boxed(handler),
            compiled: None,
        })
    }

    /// The parsed pattern.
    #[must_use]
    pub fn pattern(&self) -> &UriTemplate {
        &self.pattern
    }

    /// Compile the parameter schema, if the template declares one.
    pub(crate) fn compile_schema(&mut self, validator: &dyn SchemaValidator) {
        self.compiled = self
            .template
            .parameters
            .as_ref()
            .map(|schema| validator.compile(schema));
    }

    pub(crate) fn compiled_schema(&self) -> Option<&dyn CompiledSchema> {
        self.compiled.as_deref()
    }

    /// Run the handler.
    pub fn call(
        &self,
        request: ResourceRequest,
        session: SessionContext,
    ) -> HandlerFuture<ResourceContents> {
        (self.handler)(request, session)
    }
}

impl std::fmt::Debug for RegisteredTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTemplate")
            .field("uri_template", &self.template.uri_template)
            .finish_non_exhaustive()
    }
}
