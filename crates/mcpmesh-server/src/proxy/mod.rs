//! Remote providers behind a transport.
//!
//! A [`ProxyBridge`] makes a remote provider look like a local one. Lookups
//! and listings are answered from a cached catalog fetched with the list
//! methods; invocations are forwarded with the progress token set to the
//! outbound request id, so remote progress and log notifications for that
//! call can be relayed onto the caller's session.
//!
//! # Cancellation
//!
//! When the caller cancels, the bridge stops waiting and returns
//! [`McpError::Cancelled`]. If the transport supports it a cancel message
//! is sent to the remote side. Otherwise the remote call keeps running and
//! its result is discarded; nothing on this side reports that the remote
//! work is still in progress.

mod loopback;
mod transport;

pub use loopback::LoopbackTransport;
pub use transport::{RemoteEvent, RemoteEventKind, RemoteRequest, RemoteTransport};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use mcpmesh_core::error::{McpError, TransportError, codes};
use mcpmesh_core::protocol::RequestId;
use mcpmesh_core::types::{
    Capability, CapabilityKind, GetPromptResult, Prompt, Resource, ResourceContents,
    ResourceTemplate, Tool, ToolOutput,
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, trace, warn};

use crate::compose::Snapshot;
use crate::config::{CachePolicy, ProxyConfig};
use crate::context::{CancellationToken, SessionContext};
use crate::provider::{Provider, ProviderId, ResourceMatch};
use crate::router::{list_field, list_method, methods};

// A remote that never stops paginating is treated as broken.
const MAX_PAGES: usize = 1024;

struct CacheState {
    catalog: Option<Arc<Snapshot>>,
    generation: u64,
    events: broadcast::Receiver<RemoteEvent>,
}

/// A provider whose capabilities live on the other side of a transport.
pub struct ProxyBridge {
    id: ProviderId,
    name: String,
    transport: Arc<dyn RemoteTransport>,
    config: ProxyConfig,
    cache: Mutex<CacheState>,
    next_id: AtomicU64,
}

impl ProxyBridge {
    /// A bridge with default configuration.
    pub fn new(name: impl Into<String>, transport: Arc<dyn RemoteTransport>) -> Self {
        Self::with_config(name, transport, ProxyConfig::default())
    }

    /// A bridge with the given configuration.
    pub fn with_config(
        name: impl Into<String>,
        transport: Arc<dyn RemoteTransport>,
        config: ProxyConfig,
    ) -> Self {
        let events = transport.subscribe();
        Self {
            id: ProviderId::new(),
            name: name.into(),
            transport,
            config,
            cache: Mutex::new(CacheState {
                catalog: None,
                generation: 0,
                events,
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// The bridge configuration.
    #[must_use]
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Drop the cached catalog; the next lookup refetches it.
    pub fn invalidate(&self) {
        let mut cache = self.cache_state();
        if cache.catalog.take().is_some() {
            debug!(proxy = %self.name, "invalidated remote catalog");
        }
        cache.generation += 1;
    }

    fn cache_state(&self) -> MutexGuard<'_, CacheState> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_request_id(&self) -> RequestId {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        RequestId::string(format!("{}-{n}", self.name))
    }

    // ========================================================================
    // Catalog
    // ========================================================================

    async fn catalog(&self) -> Result<Arc<Snapshot>, McpError> {
        let generation = {
            let mut cache = self.cache_state();
            loop {
                match cache.events.try_recv() {
                    Ok(RemoteEvent {
                        kind: RemoteEventKind::ListChanged(kind),
                        ..
                    }) => {
                        debug!(proxy = %self.name, kind = %kind, "remote catalog changed");
                        cache.catalog = None;
                        cache.generation += 1;
                    }
                    Ok(_) => {}
                    Err(TryRecvError::Lagged(skipped)) => {
                        warn!(proxy = %self.name, skipped, "missed remote notifications, refetching catalog");
                        cache.catalog = None;
                        cache.generation += 1;
                    }
                    Err(TryRecvError::Empty | TryRecvError::Closed) => break,
                }
            }
            if self.config.cache == CachePolicy::UntilInvalidated {
                if let Some(catalog) = &cache.catalog {
                    return Ok(catalog.clone());
                }
            }
            cache.generation
        };

        let catalog = Arc::new(self.fetch_catalog().await?);
        if self.config.cache == CachePolicy::UntilInvalidated {
            let mut cache = self.cache_state();
            // Invalidated while fetching: hand this result out once, don't keep it.
            if cache.generation == generation {
                cache.catalog = Some(catalog.clone());
            }
        }
        Ok(catalog)
    }

    async fn fetch_catalog(&self) -> Result<Snapshot, McpError> {
        let mut capabilities = Vec::new();
        for kind in [
            CapabilityKind::Tool,
            CapabilityKind::Resource,
            CapabilityKind::ResourceTemplate,
            CapabilityKind::Prompt,
        ] {
            self.fetch_kind(kind, &mut capabilities).await?;
        }
        debug!(proxy = %self.name, count = capabilities.len(), "fetched remote catalog");
        Ok(Snapshot::new(capabilities))
    }

    async fn fetch_kind(
        &self,
        kind: CapabilityKind,
        into: &mut Vec<Capability>,
    ) -> Result<(), McpError> {
        let method = list_method(kind);
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_PAGES {
            let params = match &cursor {
                Some(cursor) => json!({ "cursor": cursor }),
                None => json!({}),
            };
            let request = RemoteRequest {
                id: self.next_request_id(),
                method: method.to_string(),
                params,
            };
            let page = match self
                .transport
                .send_request(request, CancellationToken::new())
                .await
            {
                Ok(page) => page,
                Err(err) if err.remote_code() == Some(codes::METHOD_NOT_FOUND) => {
                    debug!(proxy = %self.name, method, "remote does not list this kind");
                    return Ok(());
                }
                Err(err) => return Err(McpError::upstream(kind, method, err)),
            };
            let items = page
                .get(list_field(kind))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for item in items {
                into.push(parse_capability(kind, method, item)?);
            }
            cursor = page
                .get("nextCursor")
                .and_then(Value::as_str)
                .map(str::to_string);
            if cursor.is_none() {
                return Ok(());
            }
        }
        Err(McpError::upstream(
            kind,
            method,
            TransportError::invalid_message(format!("{method}: pagination did not terminate")),
        ))
    }

    // ========================================================================
    // Forwarding
    // ========================================================================

    async fn forward(
        &self,
        kind: CapabilityKind,
        key: &str,
        method: &str,
        mut params: Value,
        session: &SessionContext,
    ) -> Result<Value, McpError> {
        let id = self.next_request_id();
        params["_meta"] = json!({ "progressToken": id });

        // Subscribe before sending so no notification for this call is missed.
        let mut events = self.transport.subscribe();
        let cancel = CancellationToken::new();
        let request = RemoteRequest {
            id: id.clone(),
            method: method.to_string(),
            params,
        };
        let timeout = self.config.request_timeout;
        let call = async {
            let send = self.transport.send_request(request, cancel.clone());
            match timeout {
                Some(duration) => tokio::time::timeout(duration, send)
                    .await
                    .unwrap_or_else(|_| {
                        Err(TransportError::Timeout {
                            operation: method.to_string(),
                            duration,
                        })
                    }),
                None => send.await,
            }
        };
        tokio::pin!(call);

        debug!(proxy = %self.name, method, key, request_id = %id, "forwarding to remote");
        let mut events_open = true;
        let outcome = loop {
            tokio::select! {
                biased;
                result = &mut call => break result,
                () = session.cancelled() => {
                    cancel.cancel();
                    self.cancel_remote(&id).await;
                    return Err(McpError::cancelled_with_reason(
                        format!("{method} {key}"),
                        "cancelled by caller",
                    ));
                }
                event = events.recv(), if events_open => match event {
                    Ok(event) => self.relay(&id, event, session),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(proxy = %self.name, request_id = %id, skipped, "dropped remote notifications");
                    }
                    Err(RecvError::Closed) => events_open = false,
                },
            }
        };

        // Notifications the remote sent before its response.
        loop {
            match events.try_recv() {
                Ok(event) => self.relay(&id, event, session),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(proxy = %self.name, request_id = %id, skipped, "dropped remote notifications");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }

        outcome.map_err(|err| {
            if matches!(err, TransportError::Timeout { .. }) {
                cancel.cancel();
            }
            McpError::upstream(kind, key, err)
        })
    }

    async fn cancel_remote(&self, id: &RequestId) {
        if !self.transport.supports_cancellation() {
            warn!(
                proxy = %self.name,
                request_id = %id,
                transport = %self.transport.describe(),
                "transport cannot cancel; remote call may continue"
            );
            return;
        }
        if let Err(err) = self.transport.send_cancel(id, Some("cancelled by caller")).await {
            warn!(proxy = %self.name, request_id = %id, error = %err, "failed to send remote cancel");
        }
    }

    fn relay(&self, id: &RequestId, event: RemoteEvent, session: &SessionContext) {
        if let RemoteEventKind::ListChanged(kind) = &event.kind {
            debug!(proxy = %self.name, kind = %kind, "remote catalog changed");
            self.invalidate();
            return;
        }
        if event.request_id.as_ref() != Some(id) {
            trace!(
                proxy = %self.name,
                request_id = %id,
                event = %event.kind,
                "ignoring uncorrelated remote notification"
            );
            return;
        }
        match event.kind {
            RemoteEventKind::Progress(update) => session.relay_progress(&update),
            RemoteEventKind::Log(record) => session.log_record(&record),
            RemoteEventKind::ListChanged(_) => {}
        }
    }

    fn ensure_live(session: &SessionContext, operation: &str, key: &str) -> Result<(), McpError> {
        if session.is_cancelled() {
            return Err(McpError::cancelled(format!("{operation} {key}")));
        }
        Ok(())
    }
}

// Catalog failures are reported against the list method that produced them.
fn parse_capability(
    kind: CapabilityKind,
    method: &str,
    item: Value,
) -> Result<Capability, McpError> {
    let decode_err = |e: serde_json::Error| {
        McpError::upstream(
            kind,
            method,
            TransportError::invalid_message(format!("malformed remote {kind}: {e}")),
        )
    };
    Ok(match kind {
        CapabilityKind::Tool => {
            Capability::Tool(serde_json::from_value::<Tool>(item).map_err(decode_err)?)
        }
        CapabilityKind::Resource => {
            Capability::Resource(serde_json::from_value::<Resource>(item).map_err(decode_err)?)
        }
        CapabilityKind::ResourceTemplate => Capability::ResourceTemplate(
            serde_json::from_value::<ResourceTemplate>(item).map_err(decode_err)?,
        ),
        CapabilityKind::Prompt => {
            Capability::Prompt(serde_json::from_value::<Prompt>(item).map_err(decode_err)?)
        }
    })
}

fn decode_result<T: DeserializeOwned>(
    kind: CapabilityKind,
    key: &str,
    value: Value,
) -> Result<T, McpError> {
    serde_json::from_value(value).map_err(|e| {
        McpError::upstream(
            kind,
            key,
            TransportError::invalid_message(format!("malformed remote result: {e}")),
        )
    })
}

#[async_trait]
impl Provider for ProxyBridge {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn reaches(&self, id: ProviderId) -> bool {
        self.transport.reaches(id)
    }

    async fn capabilities(&self) -> Result<Vec<Capability>, McpError> {
        Ok(self.catalog().await?.capabilities().to_vec())
    }

    async fn lookup_tool(&self, name: &str) -> Result<Tool, McpError> {
        self.catalog()
            .await?
            .tool(name)
            .cloned()
            .ok_or_else(|| McpError::tool_not_found(name))
    }

    async fn lookup_prompt(&self, name: &str) -> Result<Prompt, McpError> {
        self.catalog()
            .await?
            .prompt(name)
            .cloned()
            .ok_or_else(|| McpError::prompt_not_found(name))
    }

    async fn lookup_resource(&self, uri: &str) -> Result<ResourceMatch, McpError> {
        // Remote query handling is the remote's business; match leniently here.
        self.catalog()
            .await?
            .lookup_resource(uri, mcpmesh_core::template::QueryPolicy::Ignore)
            .ok_or_else(|| McpError::resource_not_found(uri))
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        session: &SessionContext,
    ) -> Result<ToolOutput, McpError> {
        Self::ensure_live(session, methods::TOOLS_CALL, name)?;
        self.lookup_tool(name).await?;
        let params = json!({ "name": name, "arguments": arguments });
        let result = self
            .forward(CapabilityKind::Tool, name, methods::TOOLS_CALL, params, session)
            .await?;
        decode_result(CapabilityKind::Tool, name, result)
    }

    /// Only the first entry of the remote `contents` array is returned.
    async fn read_resource(
        &self,
        uri: &str,
        session: &SessionContext,
    ) -> Result<ResourceContents, McpError> {
        Self::ensure_live(session, methods::RESOURCES_READ, uri)?;
        self.lookup_resource(uri).await?;
        let params = json!({ "uri": uri });
        let result = self
            .forward(CapabilityKind::Resource, uri, methods::RESOURCES_READ, params, session)
            .await?;
        let mut contents: Vec<ResourceContents> = decode_result(
            CapabilityKind::Resource,
            uri,
            result.get("contents").cloned().unwrap_or(Value::Null),
        )?;
        if contents.is_empty() {
            return Err(McpError::upstream(
                CapabilityKind::Resource,
                uri,
                TransportError::invalid_message("remote returned no contents"),
            ));
        }
        if contents.len() > 1 {
            debug!(
                proxy = %self.name,
                uri,
                discarded = contents.len() - 1,
                "remote returned several contents, keeping the first"
            );
        }
        Ok(contents.swap_remove(0))
    }

    async fn get_prompt(
        &self,
        name: &str,
        arguments: Map<String, Value>,
        session: &SessionContext,
    ) -> Result<GetPromptResult, McpError> {
        Self::ensure_live(session, methods::PROMPTS_GET, name)?;
        self.lookup_prompt(name).await?;
        let params = json!({ "name": name, "arguments": arguments });
        let result = self
            .forward(CapabilityKind::Prompt, name, methods::PROMPTS_GET, params, session)
            .await?;
        decode_result(CapabilityKind::Prompt, name, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::Server;
    use crate::sink::{ChannelSink, SessionEvent};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    fn remote() -> Arc<Server> {
        let server = Server::new("remote");
        server
            .add_tool(Tool::new("crunch"), |_, session: SessionContext| async move {
                session.report_progress(1.0, Some(2.0), Some("half"));
                session.info("crunching");
                session.report_progress(2.0, Some(2.0), None);
                Ok(ToolOutput::text("crunched"))
            })
            .unwrap();
        Arc::new(server)
    }

    #[tokio::test]
    async fn test_progress_relayed_with_same_values() {
        let transport = Arc::new(LoopbackTransport::new(remote()));
        let bridge = ProxyBridge::new("up", transport);
        let (sink, mut rx) = ChannelSink::new();
        let session = SessionContext::builder(42u64).sink(Arc::new(sink)).build();

        let out = bridge.call_tool("crunch", json!({}), &session).await.unwrap();
        assert_eq!(out.first_text(), Some("crunched"));

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| *e.request_id() == RequestId::from(42u64)));
        let SessionEvent::Progress { update, .. } = &events[0] else {
            panic!("expected progress first");
        };
        assert_eq!(update.progress, 1.0);
        assert_eq!(update.total, Some(2.0));
        assert_eq!(update.message.as_deref(), Some("half"));
        assert!(matches!(&events[1], SessionEvent::Log { record, .. } if record.message == "crunching"));
    }

    #[tokio::test]
    async fn test_unknown_remote_name_is_local_not_found() {
        let bridge = ProxyBridge::new("up", Arc::new(LoopbackTransport::new(remote())));
        let err = bridge
            .call_tool("missing", json!({}), &SessionContext::new(1u64))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_remote_failure_is_upstream() {
        let server = Server::new("remote");
        server
            .add_tool(Tool::new("broken"), |_, _| async {
                Err(McpError::internal("disk on fire"))
            })
            .unwrap();
        let bridge = ProxyBridge::new("up", Arc::new(LoopbackTransport::new(Arc::new(server))));
        let err = bridge
            .call_tool("broken", json!({}), &SessionContext::new(1u64))
            .await
            .unwrap_err();
        assert_eq!(err.origin(), Some(mcpmesh_core::error::ErrorOrigin::Upstream));
        assert!(err.to_string().contains("disk on fire"));
    }

    #[tokio::test]
    async fn test_catalog_cached_until_list_changed() {
        let server = remote();
        let transport = Arc::new(LoopbackTransport::new(server.clone()));
        let bridge = ProxyBridge::new("up", transport.clone());

        assert!(bridge.lookup_tool("crunch").await.is_ok());
        server
            .add_tool(Tool::new("late"), |_, _| async { Ok(ToolOutput::text("late")) })
            .unwrap();
        assert!(bridge.lookup_tool("late").await.unwrap_err().is_not_found());

        transport.notify_list_changed(CapabilityKind::Tool);
        assert!(bridge.lookup_tool("late").await.is_ok());

        server.unregister(CapabilityKind::Tool, "late").unwrap();
        bridge.invalidate();
        assert!(bridge.lookup_tool("late").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_per_call_cache_policy() {
        let server = remote();
        let bridge = ProxyBridge::with_config(
            "up",
            Arc::new(LoopbackTransport::new(server.clone())),
            ProxyConfig::default().cache(CachePolicy::PerCall),
        );
        assert!(bridge.lookup_tool("late").await.is_err());
        server
            .add_tool(Tool::new("late"), |_, _| async { Ok(ToolOutput::text("late")) })
            .unwrap();
        assert!(bridge.lookup_tool("late").await.is_ok());
    }

    #[tokio::test]
    async fn test_cancellation_reaches_remote() {
        let observed = Arc::new(AtomicBool::new(false));
        let server = Server::new("remote");
        let flag = observed.clone();
        server
            .add_tool(Tool::new("wait"), move |_, session: SessionContext| {
                let flag = flag.clone();
                async move {
                    session.cancelled().await;
                    flag.store(true, Ordering::SeqCst);
                    Ok(ToolOutput::text("stopped"))
                }
            })
            .unwrap();
        let transport = Arc::new(LoopbackTransport::new(Arc::new(server)));
        let bridge = Arc::new(ProxyBridge::new("up", transport.clone()));
        let session = SessionContext::new(1u64);

        let call = {
            let bridge = bridge.clone();
            let session = session.clone();
            tokio::spawn(async move { bridge.call_tool("wait", json!({}), &session).await })
        };
        tokio::time::timeout(Duration::from_secs(5), async {
            while transport.in_flight() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        session.cancel();
        let err = call.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());

        tokio::time::timeout(Duration::from_secs(5), async {
            while !observed.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let server = Server::new("remote");
        server
            .add_tool(Tool::new("slow"), |_, _| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(ToolOutput::text("late"))
            })
            .unwrap();
        let bridge = ProxyBridge::with_config(
            "up",
            Arc::new(LoopbackTransport::new(Arc::new(server))),
            ProxyConfig::default().request_timeout(Duration::from_millis(20)),
        );
        let err = bridge
            .call_tool("slow", json!({}), &SessionContext::new(1u64))
            .await
            .unwrap_err();
        assert_eq!(err.origin(), Some(mcpmesh_core::error::ErrorOrigin::Upstream));
        assert!(err.to_string().contains("timed out"));
    }
}
