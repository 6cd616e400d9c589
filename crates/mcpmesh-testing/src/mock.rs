//! A scripted [`RemoteTransport`] for proxy tests.
//!
//! Replies are keyed by method, or by method and target
//! (`"tools/call:search"`, `"resources/read:file:///a"`). The most specific
//! key wins. Requests without a scripted reply fail with a remote
//! method-not-found error, which is also how a remote that does not list a
//! capability kind answers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use mcpmesh_core::error::{TransportError, codes};
use mcpmesh_core::protocol::RequestId;
use mcpmesh_core::types::{Capability, CapabilityKind};
use mcpmesh_server::context::CancellationToken;
use mcpmesh_server::proxy::{RemoteEvent, RemoteEventKind, RemoteRequest, RemoteTransport};
use mcpmesh_server::router::{list_field, list_method, methods};
use serde_json::{Map, Value, json};
use tokio::sync::broadcast;

/// How the mock answers a request.
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    /// Succeed with this result.
    Ok(Value),
    /// Fail with a remote error.
    Remote {
        /// Error code.
        code: i32,
        /// Error message.
        message: String,
    },
    /// Never answer; wait to be cancelled.
    Hang,
}

impl MockReply {
    /// A remote error reply.
    #[must_use]
    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self::Remote {
            code,
            message: message.into(),
        }
    }
}

// Listings carry bare descriptors, without the kind tag.
fn descriptor(capability: &Capability) -> Value {
    let value = match capability {
        Capability::Tool(t) => serde_json::to_value(t),
        Capability::Resource(r) => serde_json::to_value(r),
        Capability::ResourceTemplate(t) => serde_json::to_value(t),
        Capability::Prompt(p) => serde_json::to_value(p),
    };
    value.unwrap_or_default()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A transport that answers from a script.
pub struct MockTransport {
    replies: Mutex<HashMap<String, MockReply>>,
    scripted_events: Mutex<HashMap<String, Vec<RemoteEventKind>>>,
    requests: Mutex<Vec<RemoteRequest>>,
    cancels: Mutex<Vec<RequestId>>,
    pending: Mutex<HashMap<RequestId, CancellationToken>>,
    cancellation: AtomicBool,
    events: broadcast::Sender<RemoteEvent>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// An empty script, with cancellation support.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            replies: Mutex::new(HashMap::new()),
            scripted_events: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            cancels: Mutex::new(Vec::new()),
            pending: Mutex::new(HashMap::new()),
            cancellation: AtomicBool::new(true),
            events,
        }
    }

    /// Answer requests matching `key` with `reply`.
    #[must_use]
    pub fn on(self, key: impl Into<String>, reply: MockReply) -> Self {
        lock(&self.replies).insert(key.into(), reply);
        self
    }

    /// Emit `event` for each request matching `key`, before replying.
    #[must_use]
    pub fn emit(self, key: impl Into<String>, event: RemoteEventKind) -> Self {
        lock(&self.scripted_events)
            .entry(key.into())
            .or_default()
            .push(event);
        self
    }

    /// Serve a single-page listing of `capabilities`, grouped by kind.
    #[must_use]
    pub fn with_capabilities(self, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        let mut by_kind: HashMap<CapabilityKind, Vec<Capability>> = HashMap::new();
        for capability in capabilities {
            by_kind.entry(capability.kind()).or_default().push(capability);
        }
        by_kind
            .into_iter()
            .fold(self, |mock, (kind, items)| mock.with_pages(kind, vec![items]))
    }

    /// Serve a listing of `kind` split over `pages`, linked by cursors.
    #[must_use]
    pub fn with_pages(self, kind: CapabilityKind, pages: Vec<Vec<Capability>>) -> Self {
        let method = list_method(kind);
        let count = pages.len();
        let mut mock = self;
        for (index, page) in pages.into_iter().enumerate() {
            let mut body = Map::new();
            body.insert(
                list_field(kind).to_string(),
                page.iter().map(descriptor).collect(),
            );
            if index + 1 < count {
                body.insert("nextCursor".to_string(), json!(format!("page-{}", index + 1)));
            }
            let key = if index == 0 {
                method.to_string()
            } else {
                format!("{method}@page-{index}")
            };
            mock = mock.on(key, MockReply::Ok(Value::Object(body)));
        }
        mock
    }

    /// Claim cancellation is unsupported.
    #[must_use]
    pub fn without_cancellation(self) -> Self {
        self.cancellation.store(false, Ordering::Relaxed);
        self
    }

    /// Broadcast an event to every subscriber.
    pub fn publish(&self, event: RemoteEvent) {
        let _ = self.events.send(event);
    }

    /// Every request received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<RemoteRequest> {
        lock(&self.requests).clone()
    }

    /// Requests received for `method`.
    #[must_use]
    pub fn requests_for(&self, method: &str) -> Vec<RemoteRequest> {
        lock(&self.requests)
            .iter()
            .filter(|r| r.method == method)
            .cloned()
            .collect()
    }

    /// Ids passed to [`RemoteTransport::send_cancel`].
    #[must_use]
    pub fn cancels(&self) -> Vec<RequestId> {
        lock(&self.cancels).clone()
    }

    /// Number of hanging requests.
    #[must_use]
    pub fn pending(&self) -> usize {
        lock(&self.pending).len()
    }

    fn keys(request: &RemoteRequest) -> Vec<String> {
        let params = &request.params;
        let target = match request.method.as_str() {
            methods::TOOLS_CALL | methods::PROMPTS_GET => params.get("name"),
            methods::RESOURCES_READ => params.get("uri"),
            _ => None,
        };
        let mut keys = Vec::with_capacity(2);
        if let Some(target) = target.and_then(Value::as_str) {
            keys.push(format!("{}:{target}", request.method));
        }
        match params.get("cursor").and_then(Value::as_str) {
            Some(cursor) => keys.push(format!("{}@{cursor}", request.method)),
            None => keys.push(request.method.clone()),
        }
        keys
    }

    async fn hang(&self, id: &RequestId, cancel: &CancellationToken) -> TransportError {
        let remote = CancellationToken::new();
        lock(&self.pending).insert(id.clone(), remote.clone());
        let _pending = PendingGuard {
            pending: &self.pending,
            id,
        };
        tokio::select! {
            () = cancel.cancelled() => {}
            () = remote.cancelled() => {}
        }
        TransportError::remote(codes::REQUEST_CANCELLED, "request cancelled")
    }
}

// Clears the pending entry even when the caller drops the request future.
struct PendingGuard<'a> {
    pending: &'a Mutex<HashMap<RequestId, CancellationToken>>,
    id: &'a RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(self.id);
    }
}

#[async_trait]
impl RemoteTransport for MockTransport {
    async fn send_request(
        &self,
        request: RemoteRequest,
        cancel: CancellationToken,
    ) -> Result<Value, TransportError> {
        lock(&self.requests).push(request.clone());
        let keys = Self::keys(&request);

        let events: Vec<RemoteEventKind> = {
            let scripted = lock(&self.scripted_events);
            keys.iter()
                .find_map(|key| scripted.get(key))
                .cloned()
                .unwrap_or_default()
        };
        for kind in events {
            self.publish(RemoteEvent {
                request_id: Some(request.id.clone()),
                kind,
            });
        }

        let reply = {
            let replies = lock(&self.replies);
            keys.iter().find_map(|key| replies.get(key)).cloned()
        };
        match reply {
            Some(MockReply::Ok(value)) => Ok(value),
            Some(MockReply::Remote { code, message }) => Err(TransportError::remote(code, message)),
            Some(MockReply::Hang) => Err(self.hang(&request.id, &cancel).await),
            None => Err(TransportError::remote(
                codes::METHOD_NOT_FOUND,
                format!("no scripted reply for {}", request.method),
            )),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<RemoteEvent> {
        self.events.subscribe()
    }

    fn supports_cancellation(&self) -> bool {
        self.cancellation.load(Ordering::Relaxed)
    }

    async fn send_cancel(&self, id: &RequestId, _reason: Option<&str>) -> Result<(), TransportError> {
        if !self.supports_cancellation() {
            return Err(TransportError::unsupported("cancel"));
        }
        lock(&self.cancels).push(id.clone());
        if let Some(token) = lock(&self.pending).get(id) {
            token.cancel();
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}
