//! Host Log Forwarding
//!
//! Engine logs are emitted through `tracing`. Hosts that want them in their
//! own pipeline (a GUI log pane, a platform logger) implement [`LoggerSink`]
//! and register it through the runtime's logging config.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// One forwarded log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
    /// Emitting module, e.g. `core_sync::transfer`
    pub target: String,
    pub message: String,
    /// Structured fields recorded on the event, already redacted
    pub fields: HashMap<String, String>,
    /// Name of the innermost span, such as the sync run span
    pub span: Option<String>,
}

impl LogEntry {
    pub fn new(level: LogLevel, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            timestamp: Utc::now(),
            target: target.into(),
            message: message.into(),
            fields: HashMap::new(),
            span: None,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_span(mut self, span: impl Into<String>) -> Self {
        self.span = Some(span.into());
        self
    }
}

/// Receiver for forwarded engine logs.
///
/// Credentials never reach a sink: fields whose names look sensitive are
/// redacted before the entry is built.
///
/// ```ignore
/// use bridge_traits::{LogEntry, LogLevel, LoggerSink};
///
/// async fn report_failure(sink: &dyn LoggerSink, filename: &str) {
///     let entry = LogEntry::new(LogLevel::Warn, "host", "Transfer failed")
///         .with_field("filename", filename);
///     sink.log(entry).await.ok();
/// }
/// ```
#[async_trait::async_trait]
pub trait LoggerSink: Send + Sync {
    async fn log(&self, entry: LogEntry) -> Result<()>;

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Entries below this level are dropped before forwarding.
    fn min_level(&self) -> LogLevel {
        LogLevel::Info
    }
}
