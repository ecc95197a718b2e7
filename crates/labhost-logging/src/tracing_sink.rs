//! Sink that mirrors entries into `tracing` events.

use labhost_core::{LogEntry, LogLevel};

use crate::{LogSink, LogSinkError};

/// Forwards every entry to the active `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn write(&self, entry: LogEntry) -> Result<(), LogSinkError> {
        let category = entry.category.as_str();
        let summary = entry.cause.as_ref().map(|cause| cause.summary());
        let cause = summary.as_deref();
        match entry.level {
            LogLevel::Info => tracing::info!(category, cause, "{}", entry.message),
            LogLevel::Warning => tracing::warn!(category, cause, "{}", entry.message),
            LogLevel::Error => tracing::error!(category, cause, "{}", entry.message),
        }
        Ok(())
    }
}
