#![warn(missing_docs)]
//! # labhost-logging
//!
//! ## Purpose
//! Implements the logging sink and error reporter contracts that every other
//! `labhost` component writes through.
//!
//! ## Responsibilities
//! - Define [`LogSink`], the append-only recorder of [`LogEntry`] values.
//! - Provide file, asynchronous, in-memory and `tracing` backed sinks.
//! - Define [`ErrorReporter`] for user-facing error notifications and
//!   [`FallbackNotifier`] for the last-resort blocking notification.
//! - Offer [`AuditLog`], the non-throwing `log_info`/`log_error` facade used by
//!   the authentication gate and the host.
//!
//! ## Data flow
//! Callers build entries through [`AuditLog`] (or hand-built entries from the
//! failure funnel) -> [`LogSink::write`] -> backend (file line, queue, memory,
//! tracing event).
//!
//! ## Ownership and lifetimes
//! Entries are moved into the sink; once appended they are owned by it.
//! Sinks are shared as `Arc<dyn LogSink>` across threads.
//!
//! ## Error model
//! [`LogSink::write`] reports [`LogSinkError`] so the failure funnel can detect
//! a broken sink. [`AuditLog`] swallows those errors for ordinary callers.
//!
//! ## Security and privacy notes
//! Sinks record messages verbatim; callers must not place secrets in messages.

mod async_sink;
mod file;
mod memory;
mod report;
mod tracing_sink;

use std::sync::Arc;

use labhost_core::{Clock, FailureCause, LogEntry, LogLevel};
use thiserror::Error;

pub use async_sink::{AsyncLogSink, DEFAULT_QUEUE_CAPACITY};
pub use file::FileLogSink;
pub use memory::MemoryLogSink;
pub use report::{
    ConsoleErrorReporter, ErrorReporter, ErrorReporting, FallbackNotifier, MemoryErrorReporter,
    MemoryNotifier, ReportError, ShownError, StderrNotifier,
};
pub use tracing_sink::TracingLogSink;

/// Append-only recorder of structured log entries.
///
/// Implementations must accept concurrent writes without interleaving the
/// bytes of one entry.
pub trait LogSink: Send + Sync {
    /// Appends one entry.
    ///
    /// # Errors
    /// Returns [`LogSinkError`] when the entry could not be recorded.
    fn write(&self, entry: LogEntry) -> Result<(), LogSinkError>;

    /// Pushes buffered entries to durable storage.
    ///
    /// # Errors
    /// Returns [`LogSinkError`] when the backend cannot be flushed.
    fn flush(&self) -> Result<(), LogSinkError> {
        Ok(())
    }
}

/// Failures raised by sink backends.
#[derive(Debug, Error)]
pub enum LogSinkError {
    /// Backend I/O failed.
    #[error("log sink i/o failure: {0}")]
    Io(#[from] std::io::Error),
    /// Entry could not be encoded.
    #[error("log sink codec failure: {0}")]
    Codec(#[from] labhost_core::CoreError),
    /// Asynchronous queue is at capacity; the entry was dropped.
    #[error("log queue is full")]
    QueueFull,
    /// Sink has been shut down.
    #[error("log sink is closed")]
    Closed,
}

/// Non-throwing logging facade over a sink and a clock.
#[derive(Clone)]
pub struct AuditLog {
    sink: Arc<dyn LogSink>,
    clock: Arc<dyn Clock>,
}

impl AuditLog {
    /// Creates a facade writing to `sink` with timestamps from `clock`.
    pub fn new(sink: Arc<dyn LogSink>, clock: Arc<dyn Clock>) -> Self {
        Self { sink, clock }
    }

    /// Returns the underlying sink.
    pub fn sink(&self) -> &Arc<dyn LogSink> {
        &self.sink
    }

    /// Returns the clock used for timestamps.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Writes an Info entry.
    pub fn log_info(&self, message: impl Into<String>, category: &str) {
        self.record(LogLevel::Info, message.into(), None, category);
    }

    /// Writes a Warning entry.
    pub fn log_warning(&self, message: impl Into<String>, category: &str) {
        self.record(LogLevel::Warning, message.into(), None, category);
    }

    /// Writes an Error entry with an optional cause.
    pub fn log_error(
        &self,
        message: impl Into<String>,
        cause: Option<FailureCause>,
        category: &str,
    ) {
        self.record(LogLevel::Error, message.into(), cause, category);
    }

    /// Writes an entry at an explicit level.
    pub fn record(
        &self,
        level: LogLevel,
        message: String,
        cause: Option<FailureCause>,
        category: &str,
    ) {
        let mut entry = LogEntry::new(self.clock.now(), level, category, message);
        entry.cause = cause;
        if let Err(error) = self.sink.write(entry) {
            tracing::warn!(%error, category, "log entry dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use labhost_core::ManualClock;
    use time::macros::datetime;

    use super::*;

    #[test]
    fn audit_log_stamps_entries_with_clock_time() {
        let sink = Arc::new(MemoryLogSink::new());
        let clock = Arc::new(ManualClock::new(datetime!(2026-04-01 12:00 UTC)));
        let audit = AuditLog::new(sink.clone(), clock);

        audit.log_info("started", "Application");
        audit.log_error(
            "storage check failed",
            Some(FailureCause::new("io", "disk full")),
            "Storage",
        );

        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].timestamp, datetime!(2026-04-01 12:00 UTC));
        assert_eq!(entries[0].category, "Application");
        assert_eq!(entries[1].level, LogLevel::Error);
        assert_eq!(
            entries[1].cause.as_ref().map(|cause| cause.message.as_str()),
            Some("disk full")
        );
    }

    #[test]
    fn audit_log_swallows_sink_failures() {
        struct ClosedSink;
        impl LogSink for ClosedSink {
            fn write(&self, _entry: LogEntry) -> Result<(), LogSinkError> {
                Err(LogSinkError::Closed)
            }
        }

        let audit = AuditLog::new(
            Arc::new(ClosedSink),
            Arc::new(ManualClock::new(datetime!(2026-04-01 12:00 UTC))),
        );
        audit.log_warning("still returns", "Application");
    }
}
