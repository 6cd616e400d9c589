//! In-process transport to a local provider.
//!
//! Requests go through [`router::dispatch`] and notifications through the
//! router's notification encoding, so a bridge over a loopback sees the same
//! message shapes it would over a wire. Each request runs as its own task and
//! keeps running if the bridge stops waiting, until it is cancelled with
//! [`RemoteTransport::send_cancel`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use mcpmesh_core::error::{TransportError, codes};
use mcpmesh_core::protocol::RequestId;
use mcpmesh_core::types::CapabilityKind;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::transport::{RemoteEvent, RemoteRequest, RemoteTransport};
use crate::context::{CancellationToken, SessionContext};
use crate::provider::{Provider, ProviderId};
use crate::router;
use crate::sink::{LogRecord, LogSink, ProgressSink, ProgressUpdate};

const DEFAULT_CAPACITY: usize = 256;

type InFlight = Arc<Mutex<HashMap<RequestId, CancellationToken>>>;

/// A [`RemoteTransport`] serving a provider in the same process.
pub struct LoopbackTransport {
    target: Arc<dyn Provider>,
    events: broadcast::Sender<RemoteEvent>,
    in_flight: InFlight,
}

impl LoopbackTransport {
    /// Serve `target`.
    pub fn new(target: Arc<dyn Provider>) -> Self {
        Self::with_capacity(target, DEFAULT_CAPACITY)
    }

    /// Serve `target`, buffering up to `capacity` notifications per subscriber.
    pub fn with_capacity(target: Arc<dyn Provider>, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            target,
            events,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Announce that the served provider's catalog changed.
    pub fn notify_list_changed(&self, kind: CapabilityKind) {
        let method = router::list_changed_notification(kind);
        publish(&self.events, method, &Value::Null);
    }

    /// Number of requests currently running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn publish(events: &broadcast::Sender<RemoteEvent>, method: &str, params: &Value) {
    match router::parse_notification(method, params) {
        // No subscribers means no bridge is waiting.
        Ok(Some(event)) => {
            let _ = events.send(event);
        }
        Ok(None) => {}
        Err(err) => warn!(method, error = %err, "dropping malformed notification"),
    }
}

/// Encodes a remote-side session's notifications onto the event channel.
struct WireSink {
    events: broadcast::Sender<RemoteEvent>,
    progress_token: Option<RequestId>,
}

impl ProgressSink for WireSink {
    fn progress(&self, request_id: &RequestId, update: &ProgressUpdate) {
        let token = self.progress_token.as_ref().unwrap_or(request_id);
        let (method, params) = router::progress_notification(token, update);
        publish(&self.events, method, &params);
    }
}

impl LogSink for WireSink {
    fn log(&self, request_id: &RequestId, record: &LogRecord) {
        let (method, params) = router::log_notification(request_id, record);
        publish(&self.events, method, &params);
    }
}

struct InFlightGuard {
    in_flight: InFlight,
    id: RequestId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

#[async_trait]
impl RemoteTransport for LoopbackTransport {
    async fn send_request(
        &self,
        request: RemoteRequest,
        _cancel: CancellationToken,
    ) -> Result<Value, TransportError> {
        let RemoteRequest { id, method, params } = request;
        let progress_token: Option<RequestId> = params
            .pointer("/_meta/progressToken")
            .cloned()
            .and_then(|token| serde_json::from_value(token).ok());

        let remote_cancel = CancellationToken::new();
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), remote_cancel.clone());
        let guard = InFlightGuard {
            in_flight: self.in_flight.clone(),
            id: id.clone(),
        };

        let session = SessionContext::builder(id.clone())
            .cancellation(remote_cancel)
            .sink(Arc::new(WireSink {
                events: self.events.clone(),
                progress_token,
            }))
            .build();
        let target = self.target.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            router::dispatch(target.as_ref(), &method, params, &session).await
        });

        match task.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(err)) => Err(TransportError::remote(err.code(), err.to_string())),
            Err(join) => Err(TransportError::remote(
                codes::INTERNAL_ERROR,
                format!("remote task failed: {join}"),
            )),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<RemoteEvent> {
        self.events.subscribe()
    }

    fn supports_cancellation(&self) -> bool {
        true
    }

    async fn send_cancel(&self, id: &RequestId, reason: Option<&str>) -> Result<(), TransportError> {
        let token = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned();
        match token {
            Some(token) => {
                debug!(request_id = %id, reason = reason.unwrap_or_default(), "cancelling loopback request");
                token.cancel();
            }
            None => debug!(request_id = %id, "cancel for a request that already finished"),
        }
        Ok(())
    }

    fn reaches(&self, id: ProviderId) -> bool {
        self.target.id() == id || self.target.reaches(id)
    }

    fn describe(&self) -> String {
        format!("loopback:{}", self.target.name())
    }
}
