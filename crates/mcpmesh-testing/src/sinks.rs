//! A sink that records every notification it receives.

use std::sync::{Arc, Mutex, PoisonError};

use mcpmesh_core::protocol::RequestId;
use mcpmesh_server::context::SessionContext;
use mcpmesh_server::sink::{LogRecord, LogSink, ProgressSink, ProgressUpdate, SessionEvent};

/// Records progress updates and log records in arrival order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SessionEvent>>,
}

impl RecordingSink {
    /// An empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event so far.
    #[must_use]
    pub fn events(&self) -> Vec<SessionEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Progress updates so far.
    #[must_use]
    pub fn progress(&self) -> Vec<ProgressUpdate> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::Progress { update, .. } => Some(update),
                SessionEvent::Log { .. } => None,
            })
            .collect()
    }

    /// Log records so far.
    #[must_use]
    pub fn logs(&self) -> Vec<LogRecord> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::Log { record, .. } => Some(record),
                SessionEvent::Progress { .. } => None,
            })
            .collect()
    }

    /// Forget everything recorded.
    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn push(&self, event: SessionEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl ProgressSink for RecordingSink {
    fn progress(&self, request_id: &RequestId, update: &ProgressUpdate) {
        self.push(SessionEvent::Progress {
            request_id: request_id.clone(),
            update: update.clone(),
        });
    }
}

impl LogSink for RecordingSink {
    fn log(&self, request_id: &RequestId, record: &LogRecord) {
        self.push(SessionEvent::Log {
            request_id: request_id.clone(),
            record: record.clone(),
        });
    }
}

/// A session whose progress and log notifications land in the returned sink.
#[must_use]
pub fn recording_session(request_id: impl Into<RequestId>) -> (SessionContext, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    let session = SessionContext::builder(request_id).sink(sink.clone()).build();
    (session, sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpmesh_server::sink::LogLevel;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_records_in_order() {
        let (session, sink) = recording_session("req-1");
        session.report_progress(1.0, None, None);
        session.warning("careful");
        session.report_progress(2.0, Some(2.0), Some("done"));

        let events = sink.events();
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| *e.request_id() == RequestId::from("req-1")));
        assert_eq!(sink.progress().len(), 2);
        assert_eq!(sink.logs()[0].level, LogLevel::Warning);

        sink.clear();
        assert!(sink.events().is_empty());
    }
}
