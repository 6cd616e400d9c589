//! Per-call session context.
//!
//! A [`SessionContext`] is created once per root request and handed to
//! every handler the request reaches, across mounts and proxies. It carries
//! the request identity, a cancellation token, the notification sinks and
//! a small per-call state map.
//!
//! # Example
//!
//! ```rust
//! use mcpmesh_server::context::SessionContext;
//!
//! let session = SessionContext::new(1u64);
//! session.report_progress(1.0, Some(4.0), Some("fetching"));
//! session.info("no sinks attached, so this is a no-op");
//!
//! assert!(!session.is_cancelled());
//! assert!(session.cancel());
//! assert!(!session.cancel());
//! assert!(session.is_cancelled());
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use mcpmesh_core::protocol::{ProgressToken, RequestId};
use serde_json::Value;
use tokio_util::sync::WaitForCancellationFuture;

use crate::sink::{LogLevel, LogRecord, LogSink, NoOpSink, ProgressSink, ProgressUpdate, SessionEvent};

/// A cancellation token for tracking request cancellation.
///
/// The token transitions to cancelled at most once; [`cancel`](Self::cancel)
/// reports whether this call performed the transition.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    fired: Arc<AtomicBool>,
    inner: tokio_util::sync::CancellationToken,
}

impl CancellationToken {
    /// Create a new cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Request cancellation. Returns `true` only for the call that cancelled.
    pub fn cancel(&self) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.inner.cancel();
        true
    }

    /// A future that completes once cancellation is requested.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.inner.cancelled()
    }
}

struct Inner {
    request_id: RequestId,
    progress_token: Option<ProgressToken>,
    cancel: CancellationToken,
    progress: Arc<dyn ProgressSink>,
    logs: Arc<dyn LogSink>,
    min_level: LogLevel,
    state: Arc<Mutex<HashMap<String, Value>>>,
}

/// Request-scoped context shared by every hop of one call.
///
/// Cloning is cheap and every clone observes the same cancellation state.
#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<Inner>,
}

impl SessionContext {
    /// A session with no sinks attached.
    #[must_use]
    pub fn new(request_id: impl Into<RequestId>) -> Self {
        Self::builder(request_id).build()
    }

    /// Start building a session for a root request.
    #[must_use]
    pub fn builder(request_id: impl Into<RequestId>) -> SessionBuilder {
        SessionBuilder {
            request_id: request_id.into(),
            progress_token: None,
            cancel: None,
            progress: None,
            logs: None,
            min_level: LogLevel::Debug,
        }
    }

    /// The root request id.
    #[must_use]
    pub fn request_id(&self) -> &RequestId {
        &self.inner.request_id
    }

    /// The caller-supplied progress token, if any.
    #[must_use]
    pub fn progress_token(&self) -> Option<&ProgressToken> {
        self.inner.progress_token.as_ref()
    }

    /// The cancellation token for this session.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    /// Check if the request has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Cancel the request. Returns `true` only for the call that cancelled.
    pub fn cancel(&self) -> bool {
        let fired = self.inner.cancel.cancel();
        if fired {
            tracing::debug!(request_id = %self.inner.request_id, "session cancelled");
        }
        fired
    }

    /// A future that completes once the request is cancelled.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.inner.cancel.cancelled()
    }

    /// Report progress for this call.
    pub fn report_progress(&self, progress: f64, total: Option<f64>, message: Option<&str>) {
        self.relay_progress(&ProgressUpdate::new(
            progress,
            total,
            message.map(str::to_string),
        ));
    }

    /// Forward an already-built progress update.
    pub fn relay_progress(&self, update: &ProgressUpdate) {
        self.inner.progress.progress(&self.inner.request_id, update);
    }

    /// Emit a log record at `level`.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.log_record(&LogRecord::new(level, message));
    }

    /// Forward an already-built log record.
    ///
    /// Records below the session's minimum level are dropped.
    pub fn log_record(&self, record: &LogRecord) {
        if record.level >= self.inner.min_level {
            self.inner.logs.log(&self.inner.request_id, record);
        }
    }

    /// Log at debug level.
    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    /// Log at info level.
    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    /// Log at warning level.
    pub fn warning(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message);
    }

    /// Log at error level.
    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    /// Store a value visible to every hop of this session.
    pub fn set_state(&self, key: impl Into<String>, value: Value) {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value);
    }

    /// Read a value stored with [`set_state`](Self::set_state).
    #[must_use]
    pub fn get_state(&self, key: &str) -> Option<Value> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Start a sub-call.
    ///
    /// The sub-call shares this session's identity, cancellation and state,
    /// but buffers its notifications. They reach this session's sinks, in
    /// order, when the sub-call finishes or is dropped, so concurrent
    /// sub-calls surface in completion order.
    #[must_use]
    pub fn sub_call(&self) -> SubCall {
        let buffer = Arc::new(BufferSink::default());
        let session = Self {
            inner: Arc::new(Inner {
                request_id: self.inner.request_id.clone(),
                progress_token: self.inner.progress_token.clone(),
                cancel: self.inner.cancel.clone(),
                progress: buffer.clone(),
                logs: buffer.clone(),
                min_level: self.inner.min_level,
                state: self.inner.state.clone(),
            }),
        };
        SubCall {
            parent: self.clone(),
            session,
            buffer,
        }
    }

    /// Run `f` as a sub-call and flush its notifications when it completes.
    pub async fn run_sub_call<F, Fut, T>(&self, f: F) -> T
    where
        F: FnOnce(SessionContext) -> Fut,
        Fut: Future<Output = T>,
    {
        let sub = self.sub_call();
        let out = f(sub.session().clone()).await;
        sub.finish();
        out
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("request_id", &self.inner.request_id)
            .field("progress_token", &self.inner.progress_token)
            .field("is_cancelled", &self.is_cancelled())
            .field("min_level", &self.inner.min_level)
            .finish_non_exhaustive()
    }
}

/// Builder for [`SessionContext`].
#[must_use]
pub struct SessionBuilder {
    request_id: RequestId,
    progress_token: Option<ProgressToken>,
    cancel: Option<CancellationToken>,
    progress: Option<Arc<dyn ProgressSink>>,
    logs: Option<Arc<dyn LogSink>>,
    min_level: LogLevel,
}

impl SessionBuilder {
    /// Attach the caller's progress token.
    pub fn progress_token(mut self, token: impl Into<ProgressToken>) -> Self {
        self.progress_token = Some(token.into());
        self
    }

    /// Use an existing cancellation token.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Set the progress sink.
    pub fn progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    /// Set the log sink.
    pub fn log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.logs = Some(sink);
        self
    }

    /// Use one value as both progress and log sink.
    pub fn sink<S>(self, sink: Arc<S>) -> Self
    where
        S: ProgressSink + LogSink + 'static,
    {
        self.progress_sink(sink.clone()).log_sink(sink)
    }

    /// Drop log records below `level`.
    pub fn min_log_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Build the session.
    #[must_use]
    pub fn build(self) -> SessionContext {
        SessionContext {
            inner: Arc::new(Inner {
                request_id: self.request_id,
                progress_token: self.progress_token,
                cancel: self.cancel.unwrap_or_default(),
                progress: self.progress.unwrap_or_else(|| Arc::new(NoOpSink)),
                logs: self.logs.unwrap_or_else(|| Arc::new(NoOpSink)),
                min_level: self.min_level,
                state: Arc::new(Mutex::new(HashMap::new())),
            }),
        }
    }
}

#[derive(Default)]
struct BufferSink {
    events: Mutex<Vec<SessionEvent>>,
}

impl BufferSink {
    fn take(&self) -> Vec<SessionEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl ProgressSink for BufferSink {
    fn progress(&self, request_id: &RequestId, update: &ProgressUpdate) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SessionEvent::Progress {
                request_id: request_id.clone(),
                update: update.clone(),
            });
    }
}

impl LogSink for BufferSink {
    fn log(&self, request_id: &RequestId, record: &LogRecord) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SessionEvent::Log {
                request_id: request_id.clone(),
                record: record.clone(),
            });
    }
}

/// A scoped child of a session whose notifications are buffered.
///
/// Buffered events are flushed to the parent when the sub-call is finished
/// or dropped.
pub struct SubCall {
    parent: SessionContext,
    session: SessionContext,
    buffer: Arc<BufferSink>,
}

impl SubCall {
    /// The session to hand to the sub-call's handlers.
    #[must_use]
    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Complete the sub-call, flushing its notifications.
    pub fn finish(self) {}

    fn flush(&self) {
        for event in self.buffer.take() {
            match event {
                SessionEvent::Progress { update, .. } => self.parent.relay_progress(&update),
                SessionEvent::Log { record, .. } => self.parent.log_record(&record),
            }
        }
    }
}

impl Drop for SubCall {
    fn drop(&mut self) {
        self.flush();
    }
}

impl std::fmt::Debug for SubCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubCall")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}
