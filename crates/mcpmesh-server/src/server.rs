//! The composable server node.
//!
//! A [`Server`] owns a [`Registry`] of local capabilities and a table of
//! mounted child providers. It is itself a [`Provider`], so servers nest:
//! a parent resolves `prefix_name` by stripping the prefix and asking the
//! child, and falls back to its own registry when no mount resolves it.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use mcpmesh_server::compose::MountMode;
//! use mcpmesh_server::provider::Provider;
//! use mcpmesh_server::server::Server;
//! use mcpmesh_core::types::{Tool, ToolOutput};
//!
//! # tokio_test::block_on(async {
//! let weather = Arc::new(Server::new("weather"));
//! weather
//!     .add_tool(Tool::new("get_forecast"), |_args, _session| async {
//!         Ok(ToolOutput::text("sunny"))
//!     })
//!     .unwrap();
//!
//! let root = Server::new("root");
//! root.mount("weather", weather, MountMode::Live).await.unwrap();
//!
//! assert!(root.lookup_tool("weather_get_forecast").await.is_ok());
//! assert!(root.lookup_tool("get_forecast").await.is_err());
//! # });
//! ```

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use async_trait::async_trait;
use mcpmesh_core::error::McpError;
use mcpmesh_core::types::{
    Capability, CapabilityKind, GetPromptResult, Prompt, Resource, ResourceContents,
    ResourceTemplate, Tool, ToolOutput,
};
use mcpmesh_core::validation::SchemaValidator;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::capability::{Registration, ResourceRequest};
use crate::compose::{
    MountMode, MountNode, Snapshot, prefixes_overlap, qualify_capability, qualify_uri,
    strip_name, strip_uri,
};
use crate::config::ServerConfig;
use crate::context::SessionContext;
use crate::provider::{Provider, ProviderId, ResourceMatch};
use crate::registry::{Registry, mask_error};

/// A provider node: local registry plus mounted children.
pub struct Server {
    id: ProviderId,
    name: String,
    registry: Registry,
    mounts: RwLock<Vec<Arc<MountNode>>>,
}

// Mount edits on every server share one lock, so a cycle check and the insert
// that follows it see the same graph even when two servers mount each other.
static MOUNT_EDITS: Mutex<()> = Mutex::new(());

fn mount_edits() -> MutexGuard<'static, ()> {
    MOUNT_EDITS.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Server {
    /// A server with default configuration.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::builder(name).build()
    }

    /// Start building a server.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ServerBuilder {
        ServerBuilder {
            name: name.into(),
            config: ServerConfig::default(),
            validator: None,
        }
    }

    /// The local registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        self.registry.config()
    }

    // ========================================================================
    // Local registration
    // ========================================================================

    /// Register a local capability.
    pub fn register(&self, registration: impl Into<Registration>) -> Result<(), McpError> {
        self.registry.register(registration)
    }

    /// Remove a local capability.
    pub fn unregister(&self, kind: CapabilityKind, key: &str) -> Result<Capability, McpError> {
        self.registry.unregister(kind, key)
    }

    /// Register a local tool.
    pub fn add_tool<F, Fut>(&self, tool: Tool, handler: F) -> Result<(), McpError>
    where
        F: Fn(Value, SessionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput, McpError>> + Send + 'static,
    {
        self.registry.add_tool(tool, handler)
    }

    /// Register a local static resource.
    pub fn add_resource<F, Fut>(&self, resource: Resource, handler: F) -> Result<(), McpError>
    where
        F: Fn(ResourceRequest, SessionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ResourceContents, McpError>> + Send + 'static,
    {
        self.registry.add_resource(resource, handler)
    }

    /// Register a local resource template.
    pub fn add_template<F, Fut>(
        &self,
        template: ResourceTemplate,
        handler: F,
    ) -> Result<(), McpError>
    where
        F: Fn(ResourceRequest, SessionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ResourceContents, McpError>> + Send + 'static,
    {
        self.registry.add_template(template, handler)
    }

    /// Register a local prompt.
    pub fn add_prompt<F, Fut>(&self, prompt: Prompt, handler: F) -> Result<(), McpError>
    where
        F: Fn(Map<String, Value>, SessionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<GetPromptResult, McpError>> + Send + 'static,
    {
        self.registry.add_prompt(prompt, handler)
    }

    // ========================================================================
    // Mount table
    // ========================================================================

    /// Attach `provider` under `prefix`.
    ///
    /// Fails with [`McpError::CyclicMount`] when this server is reachable from
    /// `provider`, and with [`McpError::PrefixConflict`] when `prefix` is a
    /// string prefix of an existing mount (or the reverse). The mount table is
    /// unchanged on failure.
    pub async fn mount(
        &self,
        prefix: impl Into<String>,
        provider: Arc<dyn Provider>,
        mode: MountMode,
    ) -> Result<(), McpError> {
        let prefix = prefix.into();
        if prefix.is_empty() || prefix.contains(['/', ':', '+']) {
            return Err(McpError::invalid_request(format!(
                "invalid mount prefix '{prefix}'"
            )));
        }
        self.check_mount(&prefix, provider.as_ref())?;

        let snapshot = match mode {
            MountMode::Live => None,
            MountMode::Imported => Some(Snapshot::new(provider.capabilities().await?)),
        };

        // The graph may have changed while the snapshot was taken.
        let _edits = mount_edits();
        self.check_mount(&prefix, provider.as_ref())?;
        let node = match snapshot {
            Some(snapshot) => MountNode::imported(prefix.clone(), provider, snapshot),
            None => MountNode::live(prefix.clone(), provider),
        };
        info!(
            server = %self.name,
            prefix = %prefix,
            child = %node.provider.name(),
            mode = %mode,
            "mounted provider"
        );
        self.mounts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(node));
        Ok(())
    }

    fn check_mount(&self, prefix: &str, provider: &dyn Provider) -> Result<(), McpError> {
        if provider.id() == self.id || provider.reaches(self.id) {
            warn!(server = %self.name, prefix = %prefix, child = %provider.name(), "rejected cyclic mount");
            return Err(McpError::cyclic_mount(prefix));
        }
        if let Some(existing) = self
            .mount_table()
            .iter()
            .find(|m| prefixes_overlap(&m.prefix, prefix))
        {
            return Err(McpError::prefix_conflict(prefix, existing.prefix.clone()));
        }
        Ok(())
    }

    /// Detach the provider mounted at `prefix`.
    ///
    /// Calls already dispatched into it run to completion.
    pub async fn unmount(&self, prefix: &str) -> Result<Arc<dyn Provider>, McpError> {
        let _edits = mount_edits();
        let mut mounts = self.mounts.write().unwrap_or_else(PoisonError::into_inner);
        let index = mounts
            .iter()
            .position(|m| m.prefix == prefix)
            .ok_or_else(|| McpError::mount_not_found(prefix))?;
        let node = mounts.remove(index);
        drop(mounts);
        info!(server = %self.name, prefix = %prefix, "unmounted provider");
        Ok(node.provider.clone())
    }

    /// Refresh the snapshot of an imported mount.
    ///
    /// Live mounts are left as they are. Fails with
    /// [`McpError::MountNotFound`] if the mount is removed or replaced while
    /// the snapshot is taken.
    pub async fn reimport(&self, prefix: &str) -> Result<(), McpError> {
        let node = self
            .mount_table()
            .into_iter()
            .find(|m| m.prefix == prefix)
            .ok_or_else(|| McpError::mount_not_found(prefix))?;
        if node.mode == MountMode::Live {
            debug!(server = %self.name, prefix = %prefix, "reimport of live mount is a no-op");
            return Ok(());
        }
        let snapshot = Snapshot::new(node.provider.capabilities().await?);
        let fresh = Arc::new(MountNode::imported(
            node.prefix.clone(),
            node.provider.clone(),
            snapshot,
        ));

        let _edits = mount_edits();
        let mut mounts = self.mounts.write().unwrap_or_else(PoisonError::into_inner);
        let slot = mounts
            .iter_mut()
            .find(|m| Arc::ptr_eq(m, &node))
            .ok_or_else(|| McpError::mount_not_found(prefix))?;
        *slot = fresh;
        drop(mounts);
        info!(server = %self.name, prefix = %prefix, "reimported provider");
        Ok(())
    }

    /// `(prefix, mode)` for every direct mount, in mount order.
    #[must_use]
    pub fn mounts(&self) -> Vec<(String, MountMode)> {
        self.mount_table()
            .iter()
            .map(|m| (m.prefix.clone(), m.mode))
            .collect()
    }

    fn mount_table(&self) -> Vec<Arc<MountNode>> {
        self.mounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // ========================================================================
    // Routing
    // ========================================================================

    async fn route_tool(&self, name: &str) -> Result<Option<(Arc<MountNode>, String, Tool)>, McpError> {
        for node in self.mount_table() {
            let Some(rest) = strip_name(&node.prefix, name) else {
                continue;
            };
            let rest = rest.to_string();
            return Ok(node.resolve_tool(&rest).await?.map(|tool| (node, rest, tool)));
        }
        Ok(None)
    }

    async fn route_prompt(
        &self,
        name: &str,
    ) -> Result<Option<(Arc<MountNode>, String, Prompt)>, McpError> {
        for node in self.mount_table() {
            let Some(rest) = strip_name(&node.prefix, name) else {
                continue;
            };
            let rest = rest.to_string();
            return Ok(node.resolve_prompt(&rest).await?.map(|prompt| (node, rest, prompt)));
        }
        Ok(None)
    }

    async fn route_resource(
        &self,
        uri: &str,
    ) -> Result<Option<(Arc<MountNode>, String, ResourceMatch)>, McpError> {
        let format = self.config().resource_prefix_format;
        let policy = self.config().unknown_query_params;
        for node in self.mount_table() {
            let Some(rest) = strip_uri(&node.prefix, uri, format) else {
                continue;
            };
            let Some(found) = node.resolve_resource(&rest, policy).await? else {
                return Ok(None);
            };
            let found = ResourceMatch {
                capability: qualify_capability(&node.prefix, found.capability, format),
                params: found.params,
            };
            return Ok(Some((node, rest, found)));
        }
        Ok(None)
    }

    /// A mount hit and a local template hit for the same identifier.
    fn resource_conflict(&self, uri: &str, mounted: &ResourceMatch, local: &ResourceMatch) -> McpError {
        warn!(
            server = %self.name,
            uri = %uri,
            mounted = %mounted.capability.key(),
            local = %local.capability.key(),
            "ambiguous resource identifier"
        );
        McpError::resource_conflict(
            uri,
            vec![
                mounted.capability.key().to_string(),
                local.capability.key().to_string(),
            ],
        )
    }

    /// Report a child's failure under the caller-visible key.
    fn requalify(&self, key: &str, err: McpError) -> McpError {
        let err = match err {
            McpError::Handler(mut details) => {
                details.capability = key.to_string();
                McpError::Handler(details)
            }
            other => other,
        };
        mask_error(self.config(), err)
    }

    fn ensure_live(&self, session: &SessionContext, operation: &str, key: &str) -> Result<(), McpError> {
        if session.is_cancelled() {
            return Err(McpError::cancelled(format!("{operation} {key}")));
        }
        Ok(())
    }
}

#[async_trait]
impl Provider for Server {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn reaches(&self, id: ProviderId) -> bool {
        self.mount_table()
            .iter()
            .any(|m| m.provider.id() == id || m.provider.reaches(id))
    }

    async fn capabilities(&self) -> Result<Vec<Capability>, McpError> {
        let format = self.config().resource_prefix_format;
        let mut seen: HashSet<(CapabilityKind, String)> = HashSet::new();
        let mut all = Vec::new();
        for node in self.mount_table() {
            for capability in node.capabilities().await? {
                let capability = qualify_capability(&node.prefix, capability, format);
                if seen.insert((capability.kind(), capability.key().to_string())) {
                    all.push(capability);
                }
            }
        }
        for capability in self.registry.capabilities() {
            if seen.insert((capability.kind(), capability.key().to_string())) {
                all.push(capability);
            } else {
                debug!(
                    server = %self.name,
                    kind = %capability.kind(),
                    key = %capability.key(),
                    "local capability shadowed by a mount"
                );
            }
        }
        Ok(all)
    }

    async fn lookup_tool(&self, name: &str) -> Result<Tool, McpError> {
        match self.route_tool(name).await? {
            Some((_, _, tool)) => Ok(Tool {
                name: name.to_string(),
                ..tool
            }),
            None => self.registry.lookup_tool(name),
        }
    }

    async fn lookup_prompt(&self, name: &str) -> Result<Prompt, McpError> {
        match self.route_prompt(name).await? {
            Some((_, _, prompt)) => Ok(Prompt {
                name: name.to_string(),
                ..prompt
            }),
            None => self.registry.lookup_prompt(name),
        }
    }

    async fn lookup_resource(&self, uri: &str) -> Result<ResourceMatch, McpError> {
        if let Some(resource) = self.registry.lookup_static(uri) {
            return Ok(ResourceMatch {
                capability: resource.into(),
                params: Map::new(),
            });
        }
        let mounted = self.route_resource(uri).await?;
        let local = match &mounted {
            Some((_, _, found)) if found.capability.kind() == CapabilityKind::Resource => None,
            _ => self.registry.lookup_template(uri),
        };
        match (mounted, local) {
            (Some((_, _, mounted)), Some(local)) => Err(self.resource_conflict(uri, &mounted, &local)),
            (Some((_, _, mounted)), None) => Ok(mounted),
            (None, Some(local)) => Ok(local),
            (None, None) => Err(McpError::resource_not_found(uri)),
        }
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        session: &SessionContext,
    ) -> Result<ToolOutput, McpError> {
        self.ensure_live(session, "tools/call", name)?;
        match self.route_tool(name).await? {
            Some((node, rest, _)) => {
                debug!(server = %self.name, tool = %name, prefix = %node.prefix, "forwarding tool call to mount");
                node.provider
                    .call_tool(&rest, arguments, session)
                    .await
                    .map_err(|err| self.requalify(name, err))
            }
            None => self.registry.call_tool(name, arguments, session).await,
        }
    }

    async fn read_resource(
        &self,
        uri: &str,
        session: &SessionContext,
    ) -> Result<ResourceContents, McpError> {
        self.ensure_live(session, "resources/read", uri)?;
        if self.registry.lookup_static(uri).is_some() {
            return self.registry.read_resource(uri, session).await;
        }
        let mounted = self.route_resource(uri).await?;
        // A mounted static resource outranks local templates like a local one does.
        let local = match &mounted {
            Some((_, _, found)) if found.capability.kind() == CapabilityKind::Resource => None,
            _ => self.registry.lookup_template(uri),
        };
        match (mounted, local) {
            (Some((_, _, mounted)), Some(local)) => Err(self.resource_conflict(uri, &mounted, &local)),
            (Some((node, rest, _)), None) => {
                debug!(server = %self.name, uri = %uri, prefix = %node.prefix, "forwarding resource read to mount");
                let mut contents = node
                    .provider
                    .read_resource(&rest, session)
                    .await
                    .map_err(|err| self.requalify(uri, err))?;
                if contents.uri == rest {
                    contents.uri = qualify_uri(&node.prefix, &rest, self.config().resource_prefix_format);
                }
                Ok(contents)
            }
            (None, Some(_)) => self.registry.read_resource(uri, session).await,
            (None, None) => Err(McpError::resource_not_found(uri)),
        }
    }

    async fn get_prompt(
        &self,
        name: &str,
        arguments: Map<String, Value>,
        session: &SessionContext,
    ) -> Result<GetPromptResult, McpError> {
        self.ensure_live(session, "prompts/get", name)?;
        match self.route_prompt(name).await? {
            Some((node, rest, _)) => {
                debug!(server = %self.name, prompt = %name, prefix = %node.prefix, "forwarding prompt to mount");
                node.provider
                    .get_prompt(&rest, arguments, session)
                    .await
                    .map_err(|err| self.requalify(name, err))
            }
            None => self.registry.get_prompt(name, arguments, session).await,
        }
    }
}

/// Builder for [`Server`].
#[must_use]
pub struct ServerBuilder {
    name: String,
    config: ServerConfig,
    validator: Option<Arc<dyn SchemaValidator>>,
}

impl ServerBuilder {
    /// Set the configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the default JSON Schema validator.
    pub fn validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Build the server.
    pub fn build(self) -> Server {
        let mut registry = Registry::with_config(self.config);
        if let Some(validator) = self.validator {
            registry = registry.with_validator(validator);
        }
        Server {
            id: ProviderId::new(),
            name: self.name,
            registry,
            mounts: RwLock::new(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourcePrefixFormat;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn weather() -> Arc<Server> {
        let server = Server::new("weather");
        server
            .add_tool(
                Tool::new("get_forecast").with_string_param("city", "City name", true),
                |args: Value, _| async move {
                    let city = args["city"].as_str().unwrap_or_default().to_string();
                    Ok(ToolOutput::text(format!("{city}: sunny")))
                },
            )
            .unwrap();
        server
            .add_template(
                ResourceTemplate::new("weather://{city}/current", "current"),
                |req: ResourceRequest, _| async move {
                    let city = req.param("city").unwrap_or_default().to_string();
                    Ok(ResourceContents::text(req.uri, city))
                },
            )
            .unwrap();
        Arc::new(server)
    }

    #[tokio::test]
    async fn test_qualified_tool_resolution() {
        let root = Server::new("root");
        root.mount("weather", weather(), MountMode::Live).await.unwrap();
        let session = SessionContext::new(1u64);

        let out = root
            .call_tool("weather_get_forecast", json!({"city": "Oslo"}), &session)
            .await
            .unwrap();
        assert_eq!(out.first_text(), Some("Oslo: sunny"));

        let err = root
            .call_tool("get_forecast", json!({"city": "Oslo"}), &session)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(root.lookup_tool("weather_get_forecast").await.unwrap().name, "weather_get_forecast");
    }

    #[tokio::test]
    async fn test_qualified_resource_resolution() {
        let root = Server::new("root");
        root.mount("wx", weather(), MountMode::Live).await.unwrap();
        let session = SessionContext::new(1u64);

        let contents = root.read_resource("weather://wx/oslo/current", &session).await.unwrap();
        assert_eq!(contents.text.as_deref(), Some("oslo"));
        assert_eq!(contents.uri, "weather://wx/oslo/current");

        let found = root.lookup_resource("weather://wx/oslo/current").await.unwrap();
        assert_eq!(found.capability.key(), "weather://wx/{city}/current");

        assert!(root.read_resource("weather://oslo/current", &session).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_protocol_prefix_format() {
        let root = Server::builder("root")
            .config(ServerConfig::new().resource_prefix_format(ResourcePrefixFormat::Protocol))
            .build();
        root.mount("wx", weather(), MountMode::Live).await.unwrap();
        let contents = root
            .read_resource("wx+weather://oslo/current", &SessionContext::new(1u64))
            .await
            .unwrap();
        assert_eq!(contents.text.as_deref(), Some("oslo"));
    }

    #[tokio::test]
    async fn test_local_fallback_under_mount_prefix() {
        let root = Server::new("root");
        root.mount("weather", weather(), MountMode::Live).await.unwrap();
        root.add_tool(Tool::new("weather_report"), |_, _| async { Ok(ToolOutput::text("local")) })
            .unwrap();
        let out = root
            .call_tool("weather_report", json!({}), &SessionContext::new(1u64))
            .await
            .unwrap();
        assert_eq!(out.first_text(), Some("local"));
    }

    #[tokio::test]
    async fn test_prefix_conflicts() {
        let root = Server::new("root");
        root.mount("db", weather(), MountMode::Live).await.unwrap();
        let err = root.mount("db", weather(), MountMode::Live).await.unwrap_err();
        assert!(matches!(err, McpError::PrefixConflict { .. }));
        let err = root.mount("dbx", weather(), MountMode::Live).await.unwrap_err();
        assert!(matches!(err, McpError::PrefixConflict { .. }));
        assert_eq!(root.mounts().len(), 1);
    }

    #[tokio::test]
    async fn test_self_mount_is_cyclic() {
        let a = Arc::new(Server::new("a"));
        let b = Arc::new(Server::new("b"));
        a.mount("b", b.clone(), MountMode::Live).await.unwrap();

        let err = b.mount("a", a.clone(), MountMode::Live).await.unwrap_err();
        assert!(matches!(err, McpError::CyclicMount { .. }));
        assert!(b.mounts().is_empty());

        let err = a.mount("self", a.clone(), MountMode::Live).await.unwrap_err();
        assert!(matches!(err, McpError::CyclicMount { .. }));
    }

    /// Delegates to a server, holding `capabilities` until released.
    struct Gated {
        inner: Arc<Server>,
        entered: Arc<tokio::sync::Notify>,
        release: Arc<tokio::sync::Notify>,
    }

    #[async_trait]
    impl Provider for Gated {
        fn id(&self) -> ProviderId {
            self.inner.id()
        }

        fn name(&self) -> &str {
            self.inner.name()
        }

        fn reaches(&self, id: ProviderId) -> bool {
            self.inner.reaches(id)
        }

        async fn capabilities(&self) -> Result<Vec<Capability>, McpError> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.capabilities().await
        }

        async fn lookup_tool(&self, name: &str) -> Result<Tool, McpError> {
            self.inner.lookup_tool(name).await
        }

        async fn lookup_prompt(&self, name: &str) -> Result<Prompt, McpError> {
            self.inner.lookup_prompt(name).await
        }

        async fn lookup_resource(&self, uri: &str) -> Result<ResourceMatch, McpError> {
            self.inner.lookup_resource(uri).await
        }

        async fn call_tool(
            &self,
            name: &str,
            arguments: Value,
            session: &SessionContext,
        ) -> Result<ToolOutput, McpError> {
            self.inner.call_tool(name, arguments, session).await
        }

        async fn read_resource(
            &self,
            uri: &str,
            session: &SessionContext,
        ) -> Result<ResourceContents, McpError> {
            self.inner.read_resource(uri, session).await
        }

        async fn get_prompt(
            &self,
            name: &str,
            arguments: Map<String, Value>,
            session: &SessionContext,
        ) -> Result<GetPromptResult, McpError> {
            self.inner.get_prompt(name, arguments, session).await
        }
    }

    #[tokio::test]
    async fn test_cycle_formed_during_import_is_rejected() {
        let a = Arc::new(Server::new("a"));
        let b = Arc::new(Server::new("b"));
        let entered = Arc::new(tokio::sync::Notify::new());
        let release = Arc::new(tokio::sync::Notify::new());
        let gated = Arc::new(Gated {
            inner: b.clone(),
            entered: entered.clone(),
            release: release.clone(),
        });

        let pending = {
            let a = a.clone();
            tokio::spawn(async move { a.mount("b", gated, MountMode::Imported).await })
        };
        // `a` is snapshotting `b`; meanwhile `b` mounts `a`.
        entered.notified().await;
        b.mount("a", a.clone(), MountMode::Live).await.unwrap();
        release.notify_one();

        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, McpError::CyclicMount { .. }));
        assert!(a.mounts().is_empty());
        assert_eq!(b.mounts(), vec![("a".to_string(), MountMode::Live)]);
        assert!(!a.reaches(b.id()));
    }

    #[tokio::test]
    async fn test_reimport_after_unmount_fails() {
        let root = Server::new("root");
        root.mount("weather", weather(), MountMode::Imported).await.unwrap();
        root.reimport("weather").await.unwrap();
        root.unmount("weather").await.unwrap();
        assert!(root.reimport("weather").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_unmount() {
        let root = Server::new("root");
        root.mount("weather", weather(), MountMode::Live).await.unwrap();
        let child = root.unmount("weather").await.unwrap();
        assert_eq!(child.name(), "weather");
        assert!(root.lookup_tool("weather_get_forecast").await.unwrap_err().is_not_found());
        assert!(root.unmount("weather").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_mount_hit_and_local_template_conflict() {
        let root = Server::new("root");
        root.mount("wx", weather(), MountMode::Live).await.unwrap();
        root.add_template(ResourceTemplate::new("weather://{a}/{b}/current", "local"), |req: ResourceRequest, _| async move {
            Ok(ResourceContents::text(req.uri, "local"))
        })
        .unwrap();
        let err = root
            .read_resource("weather://wx/oslo/current", &SessionContext::new(1u64))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::ResourceConflict { .. }));
    }

    #[tokio::test]
    async fn test_listing_is_mounts_then_local() {
        let root = Server::new("root");
        root.add_tool(Tool::new("ping"), |_, _| async { Ok(ToolOutput::text("pong")) })
            .unwrap();
        root.mount("weather", weather(), MountMode::Live).await.unwrap();
        let list = root.list().await.unwrap();
        let keys: Vec<String> = list.iter().map(|s| s.key).collect();
        assert_eq!(
            keys,
            vec!["weather_get_forecast", "weather://weather/{city}/current", "ping"]
        );
    }
}
