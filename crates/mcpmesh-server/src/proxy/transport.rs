//! The call-oriented transport a proxy forwards through.

use std::fmt;

use async_trait::async_trait;
use mcpmesh_core::error::TransportError;
use mcpmesh_core::protocol::RequestId;
use mcpmesh_core::types::CapabilityKind;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::context::CancellationToken;
use crate::provider::ProviderId;
use crate::sink::{LogRecord, ProgressUpdate};

/// One outbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest {
    /// Correlation id, also sent as the progress token.
    pub id: RequestId,
    /// Protocol method, e.g. `tools/call`.
    pub method: String,
    /// Request parameters.
    pub params: Value,
}

/// A notification received from the remote side.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEvent {
    /// The outbound request this event belongs to, if the remote named one.
    pub request_id: Option<RequestId>,
    /// What happened.
    pub kind: RemoteEventKind,
}

impl RemoteEvent {
    /// A progress notification for `request_id`.
    #[must_use]
    pub fn progress(request_id: impl Into<RequestId>, update: ProgressUpdate) -> Self {
        Self {
            request_id: Some(request_id.into()),
            kind: RemoteEventKind::Progress(update),
        }
    }

    /// A log notification for `request_id`.
    #[must_use]
    pub fn log(request_id: impl Into<RequestId>, record: LogRecord) -> Self {
        Self {
            request_id: Some(request_id.into()),
            kind: RemoteEventKind::Log(record),
        }
    }

    /// A catalog change, not tied to any request.
    #[must_use]
    pub fn list_changed(kind: CapabilityKind) -> Self {
        Self {
            request_id: None,
            kind: RemoteEventKind::ListChanged(kind),
        }
    }
}

/// Remote notification payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEventKind {
    /// `notifications/progress`.
    Progress(ProgressUpdate),
    /// `notifications/message`.
    Log(LogRecord),
    /// `notifications/*/list_changed`.
    ListChanged(CapabilityKind),
}

impl fmt::Display for RemoteEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Progress(_) => write!(f, "progress"),
            Self::Log(_) => write!(f, "log"),
            Self::ListChanged(kind) => write!(f, "{kind} list changed"),
        }
    }
}

/// A transport to a remote provider.
///
/// Implementations own the wire format. The proxy only needs request and
/// response correlation plus a fan-out of notifications.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Send a request and wait for its result.
    ///
    /// `cancel` fires when the caller stops waiting; implementations may use
    /// it to abandon the exchange early.
    async fn send_request(
        &self,
        request: RemoteRequest,
        cancel: CancellationToken,
    ) -> Result<Value, TransportError>;

    /// Subscribe to remote notifications.
    ///
    /// Only events sent after the call are received.
    fn subscribe(&self) -> broadcast::Receiver<RemoteEvent>;

    /// Whether [`send_cancel`](Self::send_cancel) reaches the remote side.
    fn supports_cancellation(&self) -> bool {
        false
    }

    /// Ask the remote side to stop working on `id`.
    async fn send_cancel(&self, id: &RequestId, reason: Option<&str>) -> Result<(), TransportError> {
        let _ = (id, reason);
        Err(TransportError::unsupported("cancel"))
    }

    /// Whether the provider `id` is served, directly or through its mounts,
    /// on the other side of this transport.
    ///
    /// In-process transports know their target and can answer; wire
    /// transports cannot and report `false`.
    fn reaches(&self, id: ProviderId) -> bool {
        let _ = id;
        false
    }

    /// A short description for logs.
    fn describe(&self) -> String {
        "remote".to_string()
    }
}
