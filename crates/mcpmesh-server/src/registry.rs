//! Per-provider capability store.
//!
//! The registry owns the tools, static resources, resource templates and
//! prompts registered directly on one server node. Lookups clone an `Arc`
//! out of the table before any handler runs, so a concurrent
//! `unregister` never affects a call already in flight.
//!
//! Invocation follows a fixed order: cancellation check, argument
//! validation, handler, error wrapping. Handler errors other than
//! cancellation become [`McpError::Handler`], and are masked when the
//! server is configured with `mask_error_details`.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use indexmap::IndexMap;
use mcpmesh_core::error::{HandlerErrorDetails, McpError};
use mcpmesh_core::template::TemplateMatch;
use mcpmesh_core::types::{
    Capability, CapabilityKind, CapabilityList, GetPromptResult, Prompt, Resource,
    ResourceContents, ResourceTemplate, Tool, ToolOutput,
};
use mcpmesh_core::validation::{CompiledSchema, JsonSchemaValidator, SchemaValidator};
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::capability::{
    RegisteredPrompt, RegisteredResource, RegisteredTemplate, RegisteredTool, Registration,
    ResourceRequest,
};
use crate::config::{DuplicatePolicy, ServerConfig};
use crate::context::SessionContext;
use crate::provider::ResourceMatch;

struct Entry<T> {
    seq: u64,
    item: Arc<T>,
}

struct Entries<T>(IndexMap<String, Entry<T>>);

impl<T> Default for Entries<T> {
    fn default() -> Self {
        Self(IndexMap::new())
    }
}

#[derive(Default)]
struct Tables {
    tools: Entries<RegisteredTool>,
    resources: Entries<RegisteredResource>,
    templates: Entries<RegisteredTemplate>,
    prompts: Entries<RegisteredPrompt>,
}

enum ResolvedResource {
    Static(Arc<RegisteredResource>),
    Template(Arc<RegisteredTemplate>, TemplateMatch),
}

/// Per-provider capability store.
pub struct Registry {
    tables: RwLock<Tables>,
    config: ServerConfig,
    validator: Arc<dyn SchemaValidator>,
    seq: AtomicU64,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// An empty registry with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    /// An empty registry with the given configuration.
    #[must_use]
    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            config,
            validator: Arc::new(JsonSchemaValidator::new()),
            seq: AtomicU64::new(0),
        }
    }

    /// Replace the schema validator.
    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// The configuration this registry was built with.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register any entry.
    ///
    /// Duplicate keys follow the configured [`DuplicatePolicy`]. A template
    /// that overlaps an existing one with equal precedence is always rejected.
    /// Declared schemas are compiled here, once per entry.
    pub fn register(&self, registration: impl Into<Registration>) -> Result<(), McpError> {
        let mut registration = registration.into();
        let validator = self.validator.as_ref();
        match &mut registration {
            Registration::Tool(entry) => entry.compile_schema(validator),
            Registration::Resource(_) => {}
            Registration::Template(entry) => entry.compile_schema(validator),
            Registration::Prompt(entry) => entry.compile_schema(validator),
        }

        let policy = self.config.on_duplicate;
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let mut tables = self.write();
        match registration {
            Registration::Tool(entry) => {
                let key = entry.tool.name.clone();
                insert(&mut tables.tools, key, entry, CapabilityKind::Tool, policy, seq)
            }
            Registration::Resource(entry) => {
                let key = entry.resource.uri.clone();
                insert(&mut tables.resources, key, entry, CapabilityKind::Resource, policy, seq)
            }
            Registration::Template(entry) => {
                let key = entry.template.uri_template.clone();
                for (other_key, other) in &tables.templates.0 {
                    if *other_key == key {
                        continue;
                    }
                    let other = other.item.pattern();
                    if other.specificity() == entry.pattern().specificity()
                        && other.overlaps(entry.pattern())
                    {
                        return Err(McpError::name_conflict(
                            CapabilityKind::ResourceTemplate,
                            key,
                            format!("ties in precedence with '{other_key}'"),
                        ));
                    }
                }
                insert(
                    &mut tables.templates,
                    key,
                    entry,
                    CapabilityKind::ResourceTemplate,
                    policy,
                    seq,
                )
            }
            Registration::Prompt(entry) => {
                let key = entry.prompt.name.clone();
                insert(&mut tables.prompts, key, entry, CapabilityKind::Prompt, policy, seq)
            }
        }
    }

    /// Register a tool with a handler function.
    pub fn add_tool<F, Fut>(&self, tool: Tool, handler: F) -> Result<(), McpError>
    where
        F: Fn(Value, SessionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput, McpError>> + Send + 'static,
    {
        self.register(RegisteredTool::new(tool, handler))
    }

    /// Register a static resource with a handler function.
    pub fn add_resource<F, Fut>(&self, resource: Resource, handler: F) -> Result<(), McpError>
    where
        F: Fn(ResourceRequest, SessionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ResourceContents, McpError>> + Send + 'static,
    {
        self.register(RegisteredResource::new(resource, handler)?)
    }

    /// Register a resource template with a handler function.
    pub fn add_template<F, Fut>(
        &self,
        template: ResourceTemplate,
        handler: F,
    ) -> Result<(), McpError>
    where
        F: Fn(ResourceRequest, SessionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ResourceContents, McpError>> + Send + 'static,
    {
        self.register(RegisteredTemplate::new(template, handler)?)
    }

    /// Register a prompt with a handler function.
    pub fn add_prompt<F, Fut>(&self, prompt: Prompt, handler: F) -> Result<(), McpError>
    where
        F: Fn(Map<String, Value>, SessionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<GetPromptResult, McpError>> + Send + 'static,
    {
        self.register(RegisteredPrompt::new(prompt, handler))
    }

    /// Remove an entry, returning its descriptor.
    ///
    /// Calls that already resolved the entry run to completion.
    pub fn unregister(&self, kind: CapabilityKind, key: &str) -> Result<Capability, McpError> {
        let mut tables = self.write();
        let removed = match kind {
            CapabilityKind::Tool => tables
                .tools
                .0
                .shift_remove(key)
                .map(|e| Capability::Tool(e.item.tool.clone())),
            CapabilityKind::Resource => tables
                .resources
                .0
                .shift_remove(key)
                .map(|e| Capability::Resource(e.item.resource.clone())),
            CapabilityKind::ResourceTemplate => tables
                .templates
                .0
                .shift_remove(key)
                .map(|e| Capability::ResourceTemplate(e.item.template.clone())),
            CapabilityKind::Prompt => tables
                .prompts
                .0
                .shift_remove(key)
                .map(|e| Capability::Prompt(e.item.prompt.clone())),
        };
        drop(tables);
        match removed {
            Some(capability) => {
                debug!(kind = %kind, key = %key, "unregistered capability");
                Ok(capability)
            }
            None => Err(McpError::not_found(kind, key)),
        }
    }

    /// Whether an entry exists.
    #[must_use]
    pub fn contains(&self, kind: CapabilityKind, key: &str) -> bool {
        let tables = self.read();
        match kind {
            CapabilityKind::Tool => tables.tools.0.contains_key(key),
            CapabilityKind::Resource => tables.resources.0.contains_key(key),
            CapabilityKind::ResourceTemplate => tables.templates.0.contains_key(key),
            CapabilityKind::Prompt => tables.prompts.0.contains_key(key),
        }
    }

    /// Total number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let tables = self.read();
        tables.tools.0.len()
            + tables.resources.0.len()
            + tables.templates.0.len()
            + tables.prompts.0.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ========================================================================
    // Lookup and listing
    // ========================================================================

    /// Every descriptor, in registration order.
    #[must_use]
    pub fn capabilities(&self) -> Vec<Capability> {
        let tables = self.read();
        let mut all: Vec<(u64, Capability)> = Vec::with_capacity(
            tables.tools.0.len()
                + tables.resources.0.len()
                + tables.templates.0.len()
                + tables.prompts.0.len(),
        );
        all.extend(tables.tools.0.values().map(|e| (e.seq, e.item.tool.clone().into())));
        all.extend(
            tables
                .resources
                .0
                .values()
                .map(|e| (e.seq, e.item.resource.clone().into())),
        );
        all.extend(
            tables
                .templates
                .0
                .values()
                .map(|e| (e.seq, e.item.template.clone().into())),
        );
        all.extend(tables.prompts.0.values().map(|e| (e.seq, e.item.prompt.clone().into())));
        drop(tables);
        all.sort_by_key(|(seq, _)| *seq);
        all.into_iter().map(|(_, c)| c).collect()
    }

    /// A restartable listing in registration order.
    #[must_use]
    pub fn list(&self) -> CapabilityList {
        CapabilityList::from(self.capabilities())
    }

    /// Resolve a tool name.
    pub fn lookup_tool(&self, name: &str) -> Result<Tool, McpError> {
        self.tool_entry(name).map(|e| e.tool.clone())
    }

    /// Resolve a prompt name.
    pub fn lookup_prompt(&self, name: &str) -> Result<Prompt, McpError> {
        self.prompt_entry(name).map(|e| e.prompt.clone())
    }

    /// Resolve a resource identifier: exact static match first, then the
    /// most specific matching template.
    pub fn lookup_resource(&self, uri: &str) -> Result<ResourceMatch, McpError> {
        match self.resolve_resource(uri) {
            Some(ResolvedResource::Static(entry)) => Ok(ResourceMatch {
                capability: entry.resource.clone().into(),
                params: Map::new(),
            }),
            Some(ResolvedResource::Template(entry, m)) => Ok(ResourceMatch {
                capability: entry.template.clone().into(),
                params: m.into_params(),
            }),
            None => Err(McpError::resource_not_found(uri)),
        }
    }

    /// The static resource registered under exactly `uri`.
    #[must_use]
    pub fn lookup_static(&self, uri: &str) -> Option<Resource> {
        self.read()
            .resources
            .0
            .get(uri)
            .map(|e| e.item.resource.clone())
    }

    /// The most specific template matching `uri`, ignoring static resources.
    #[must_use]
    pub fn lookup_template(&self, uri: &str) -> Option<ResourceMatch> {
        self.best_template(uri).map(|(entry, m)| ResourceMatch {
            capability: entry.template.clone().into(),
            params: m.into_params(),
        })
    }

    fn tool_entry(&self, name: &str) -> Result<Arc<RegisteredTool>, McpError> {
        self.read()
            .tools
            .0
            .get(name)
            .map(|e| e.item.clone())
            .ok_or_else(|| McpError::tool_not_found(name))
    }

    fn prompt_entry(&self, name: &str) -> Result<Arc<RegisteredPrompt>, McpError> {
        self.read()
            .prompts
            .0
            .get(name)
            .map(|e| e.item.clone())
            .ok_or_else(|| McpError::prompt_not_found(name))
    }

    fn best_template(&self, uri: &str) -> Option<(Arc<RegisteredTemplate>, TemplateMatch)> {
        let policy = self.config.unknown_query_params;
        let tables = self.read();
        tables
            .templates
            .0
            .values()
            .filter_map(|e| e.item.pattern().matches(uri, policy).map(|m| (e, m)))
            .max_by(|(a, _), (b, _)| {
                a.item
                    .pattern()
                    .specificity()
                    .cmp(&b.item.pattern().specificity())
                    // Equal precedence cannot overlap, so this only orders
                    // by registration to keep the choice stable.
                    .then_with(|| b.seq.cmp(&a.seq))
            })
            .map(|(e, m)| (e.item.clone(), m))
    }

    fn resolve_resource(&self, uri: &str) -> Option<ResolvedResource> {
        if let Some(entry) = self.read().resources.0.get(uri) {
            return Some(ResolvedResource::Static(entry.item.clone()));
        }
        self.best_template(uri)
            .map(|(entry, m)| ResolvedResource::Template(entry, m))
    }

    // ========================================================================
    // Invocation
    // ========================================================================

    /// Call a tool.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        session: &SessionContext,
    ) -> Result<ToolOutput, McpError> {
        ensure_live(session, "tools/call", name)?;
        let entry = self.tool_entry(name)?;
        let arguments = self.validate(
            CapabilityKind::Tool,
            name,
            entry.compiled_schema(),
            &entry.tool.input_schema,
            arguments,
        )?;
        debug!(tool = %name, request_id = %session.request_id(), "calling tool");
        entry
            .call(arguments, session.clone())
            .await
            .map_err(|err| self.handler_failure(CapabilityKind::Tool, name, err))
    }

    /// Read a resource.
    pub async fn read_resource(
        &self,
        uri: &str,
        session: &SessionContext,
    ) -> Result<ResourceContents, McpError> {
        ensure_live(session, "resources/read", uri)?;
        let (entry, request) = match self.resolve_resource(uri) {
            Some(ResolvedResource::Static(entry)) => {
                debug!(uri = %uri, request_id = %session.request_id(), "reading static resource");
                let request = ResourceRequest {
                    uri: uri.to_string(),
                    params: Map::new(),
                };
                return entry
                    .call(request, session.clone())
                    .await
                    .map_err(|err| self.handler_failure(CapabilityKind::Resource, uri, err));
            }
            Some(ResolvedResource::Template(entry, m)) => {
                let params = match &entry.template.parameters {
                    Some(schema) => {
                        let validated = self.validate(
                            CapabilityKind::ResourceTemplate,
                            uri,
                            entry.compiled_schema(),
                            schema,
                            Value::Object(m.into_params()),
                        )?;
                        match validated {
                            Value::Object(map) => map,
                            _ => {
                                return Err(McpError::internal(
                                    "validator returned a non-object parameter map",
                                ));
                            }
                        }
                    }
                    None => m.into_params(),
                };
                let request = ResourceRequest {
                    uri: uri.to_string(),
                    params,
                };
                (entry, request)
            }
            None => return Err(McpError::resource_not_found(uri)),
        };
        debug!(
            uri = %uri,
            template = %entry.template.uri_template,
            request_id = %session.request_id(),
            "reading templated resource"
        );
        entry
            .call(request, session.clone())
            .await
            .map_err(|err| self.handler_failure(CapabilityKind::Resource, uri, err))
    }

    /// Render a prompt.
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Map<String, Value>,
        session: &SessionContext,
    ) -> Result<GetPromptResult, McpError> {
        ensure_live(session, "prompts/get", name)?;
        let entry = self.prompt_entry(name)?;
        let arguments = match self.validate(
            CapabilityKind::Prompt,
            name,
            entry.compiled_schema(),
            entry.schema(),
            Value::Object(arguments),
        )? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        debug!(prompt = %name, request_id = %session.request_id(), "rendering prompt");
        entry
            .call(arguments, session.clone())
            .await
            .map_err(|err| self.handler_failure(CapabilityKind::Prompt, name, err))
    }

    fn validate(
        &self,
        kind: CapabilityKind,
        key: &str,
        compiled: Option<&dyn CompiledSchema>,
        schema: &Value,
        arguments: Value,
    ) -> Result<Value, McpError> {
        let validated = match compiled {
            Some(compiled) => compiled.validate(arguments),
            None => self.validator.validate(schema, arguments),
        };
        validated.map_err(|e| McpError::invalid_arguments(kind, key, e.message, e.errors))
    }

    fn handler_failure(&self, kind: CapabilityKind, key: &str, err: McpError) -> McpError {
        let err = match err {
            McpError::Cancelled { .. } => return err,
            McpError::Handler(mut details) => {
                if details.capability.is_empty() {
                    details.capability = key.to_string();
                    details.kind = kind;
                }
                McpError::Handler(details)
            }
            other => McpError::handler(kind, key, other),
        };
        mask_error(&self.config, err)
    }
}

/// Apply `mask_error_details` to a handler failure.
///
/// Public messages pass through; everything else is replaced by a generic
/// message and the original is logged.
pub(crate) fn mask_error(config: &ServerConfig, err: McpError) -> McpError {
    if !config.mask_error_details {
        return err;
    }
    match err {
        McpError::Handler(details) if !details.public => {
            error!(
                kind = %details.kind,
                capability = %details.capability,
                origin = %details.origin,
                error = %details.message,
                "masked handler failure"
            );
            let message = match details.kind {
                CapabilityKind::Tool => format!("Error calling tool '{}'", details.capability),
                CapabilityKind::Resource | CapabilityKind::ResourceTemplate => {
                    format!("Error reading resource '{}'", details.capability)
                }
                CapabilityKind::Prompt => {
                    format!("Error rendering prompt '{}'", details.capability)
                }
            };
            McpError::Handler(Box::new(HandlerErrorDetails {
                kind: details.kind,
                capability: details.capability,
                message,
                origin: details.origin,
                public: true,
                source: None,
            }))
        }
        other => other,
    }
}

fn ensure_live(session: &SessionContext, operation: &str, key: &str) -> Result<(), McpError> {
    if session.is_cancelled() {
        debug!(operation, key, request_id = %session.request_id(), "skipping cancelled call");
        return Err(McpError::cancelled(format!("{operation} {key}")));
    }
    Ok(())
}

fn insert<T>(
    entries: &mut Entries<T>,
    key: String,
    item: T,
    kind: CapabilityKind,
    policy: DuplicatePolicy,
    seq: u64,
) -> Result<(), McpError> {
    match entries.0.get_mut(&key) {
        Some(existing) => match policy {
            DuplicatePolicy::Error => Err(McpError::name_conflict(kind, key, "already registered")),
            DuplicatePolicy::Ignore => {
                debug!(kind = %kind, key = %key, "ignoring duplicate registration");
                Ok(())
            }
            DuplicatePolicy::Warn => {
                warn!(kind = %kind, key = %key, "replacing existing registration");
                existing.item = Arc::new(item);
                Ok(())
            }
            DuplicatePolicy::Replace => {
                existing.item = Arc::new(item);
                Ok(())
            }
        },
        None => {
            debug!(kind = %kind, key = %key, "registered capability");
            entries.0.insert(
                key,
                Entry {
                    seq,
                    item: Arc::new(item),
                },
            );
            Ok(())
        }
    }
}
