//! Notification sinks for progress and log records.
//!
//! A session forwards every progress update and log record to its sinks
//! together with the request id. Sinks are synchronous: they hand the event
//! off (to a channel, to `tracing`, to a buffer) and return.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use mcpmesh_core::protocol::RequestId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

/// Log levels for MCP logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Debug level - most verbose.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Notice level.
    Notice,
    /// Warning level.
    Warning,
    /// Error level.
    Error,
    /// Critical level.
    Critical,
    /// Alert level.
    Alert,
    /// Emergency level - most severe.
    Emergency,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Notice => write!(f, "notice"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Critical => write!(f, "critical"),
            Self::Alert => write!(f, "alert"),
            Self::Emergency => write!(f, "emergency"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "notice" => Ok(Self::Notice),
            "warning" | "warn" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "critical" => Ok(Self::Critical),
            "alert" => Ok(Self::Alert),
            "emergency" => Ok(Self::Emergency),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

/// A progress update: current position, optional total, optional message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Current progress.
    pub progress: f64,
    /// Total, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    /// Human-readable status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProgressUpdate {
    /// Create an update.
    #[must_use]
    pub fn new(progress: f64, total: Option<f64>, message: Option<String>) -> Self {
        Self {
            progress,
            total,
            message,
        }
    }
}

/// One log record emitted during a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Severity.
    pub level: LogLevel,
    /// The message.
    pub message: String,
    /// Name of the emitting logger, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
    /// Structured payload, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// When the record was created.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl LogRecord {
    /// Create a record stamped with the current time.
    #[must_use]
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            logger: None,
            data: None,
            timestamp: Utc::now(),
        }
    }

    /// Set the logger name.
    #[must_use]
    pub fn with_logger(mut self, logger: impl Into<String>) -> Self {
        self.logger = Some(logger.into());
        self
    }

    /// Attach structured data.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Receives progress updates.
pub trait ProgressSink: Send + Sync {
    /// Accept one update for `request_id`.
    fn progress(&self, request_id: &RequestId, update: &ProgressUpdate);
}

/// Receives log records.
pub trait LogSink: Send + Sync {
    /// Accept one record for `request_id`.
    fn log(&self, request_id: &RequestId, record: &LogRecord);
}

/// A sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpSink;

impl ProgressSink for NoOpSink {
    fn progress(&self, _request_id: &RequestId, _update: &ProgressUpdate) {}
}

impl LogSink for NoOpSink {
    fn log(&self, _request_id: &RequestId, _record: &LogRecord) {}
}

/// A sink that forwards into `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn progress(&self, request_id: &RequestId, update: &ProgressUpdate) {
        tracing::debug!(
            request_id = %request_id,
            progress = update.progress,
            total = ?update.total,
            message = ?update.message,
            "progress"
        );
    }
}

impl LogSink for TracingSink {
    fn log(&self, request_id: &RequestId, record: &LogRecord) {
        let logger = record.logger.as_deref().unwrap_or("session");
        match record.level {
            LogLevel::Debug => {
                tracing::debug!(request_id = %request_id, logger, "{}", record.message);
            }
            LogLevel::Info | LogLevel::Notice => {
                tracing::info!(request_id = %request_id, logger, "{}", record.message);
            }
            LogLevel::Warning => {
                tracing::warn!(request_id = %request_id, logger, "{}", record.message);
            }
            LogLevel::Error | LogLevel::Critical | LogLevel::Alert | LogLevel::Emergency => {
                tracing::error!(
                    request_id = %request_id,
                    logger,
                    level = %record.level,
                    "{}",
                    record.message
                );
            }
        }
    }
}

/// A notification emitted during a call.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A progress update.
    Progress {
        /// The request the update belongs to.
        request_id: RequestId,
        /// The update.
        update: ProgressUpdate,
    },
    /// A log record.
    Log {
        /// The request the record belongs to.
        request_id: RequestId,
        /// The record.
        record: LogRecord,
    },
}

impl SessionEvent {
    /// The request this event belongs to.
    #[must_use]
    pub fn request_id(&self) -> &RequestId {
        match self {
            Self::Progress { request_id, .. } | Self::Log { request_id, .. } => request_id,
        }
    }
}

/// A sink that pushes events into an unbounded channel, for a wire layer to drain.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiving end of its channel.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn progress(&self, request_id: &RequestId, update: &ProgressUpdate) {
        // The receiver going away only means nobody is listening anymore.
        let _ = self.tx.send(SessionEvent::Progress {
            request_id: request_id.clone(),
            update: update.clone(),
        });
    }
}

impl LogSink for ChannelSink {
    fn log(&self, request_id: &RequestId, record: &LogRecord) {
        let _ = self.tx.send(SessionEvent::Log {
            request_id: request_id.clone(),
            record: record.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_ordering_and_parsing() {
        assert!(LogLevel::Debug < LogLevel::Warning);
        assert!(LogLevel::Emergency > LogLevel::Critical);
        assert_eq!("WARN".parse::<LogLevel>(), Ok(LogLevel::Warning));
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::Notice.to_string(), "notice");
    }

    #[tokio::test]
    async fn test_channel_sink_preserves_order() {
        let (sink, mut rx) = ChannelSink::new();
        let id = RequestId::Number(9);
        sink.progress(&id, &ProgressUpdate::new(1.0, Some(2.0), None));
        sink.log(&id, &LogRecord::new(LogLevel::Info, "half way"));
        sink.progress(&id, &ProgressUpdate::new(2.0, Some(2.0), None));

        assert!(matches!(rx.recv().await, Some(SessionEvent::Progress { update, .. }) if update.progress == 1.0));
        assert!(matches!(rx.recv().await, Some(SessionEvent::Log { record, .. }) if record.message == "half way"));
        assert!(matches!(rx.recv().await, Some(SessionEvent::Progress { update, .. }) if update.progress == 2.0));
    }
}
