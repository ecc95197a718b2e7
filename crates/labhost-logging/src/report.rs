//! User-facing error notification contracts.

use std::io::Write;
use std::sync::{Arc, Mutex};

use labhost_core::FailureCause;
use thiserror::Error;

use crate::AuditLog;

/// Surfaces a captured failure to the user without re-throwing.
///
/// Implementations must be safe to call from any thread and should return
/// promptly; rendering that may block belongs on the UI side.
pub trait ErrorReporter: Send + Sync {
    /// Shows `user_message`, with `cause` available as detail.
    ///
    /// # Errors
    /// Returns [`ReportError`] when the notification could not be shown.
    fn show_error(&self, cause: &FailureCause, user_message: &str) -> Result<(), ReportError>;
}

/// Last-resort notification used when logging or reporting itself failed,
/// and for fatal startup errors. Must not fail.
pub trait FallbackNotifier: Send + Sync {
    /// Presents a blocking notice (modal dialog or equivalent).
    fn notify_blocking(&self, title: &str, message: &str);
}

/// Failures raised by reporters.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Output channel failed.
    #[error("error display i/o failure: {0}")]
    Io(#[from] std::io::Error),
    /// No presentation surface is available.
    #[error("error display unavailable: {0}")]
    Unavailable(String),
}

/// Reporter that writes a short summary to a text stream (stderr by default).
pub struct ConsoleErrorReporter {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleErrorReporter {
    /// Reporter writing to standard error.
    pub fn stderr() -> Self {
        Self::to_writer(Box::new(std::io::stderr()))
    }

    /// Reporter writing to an arbitrary stream.
    pub fn to_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

impl ErrorReporter for ConsoleErrorReporter {
    fn show_error(&self, cause: &FailureCause, user_message: &str) -> Result<(), ReportError> {
        let rendered = format!("[error] {user_message}\n        detail: {}\n", cause.summary());
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        out.write_all(rendered.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

/// One notification recorded by [`MemoryErrorReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShownError {
    /// Cause passed to the reporter.
    pub cause: FailureCause,
    /// Message presented to the user.
    pub user_message: String,
}

/// Reporter that records notifications in memory.
#[derive(Debug, Default)]
pub struct MemoryErrorReporter {
    shown: Mutex<Vec<ShownError>>,
}

impl MemoryErrorReporter {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all notifications shown so far.
    pub fn shown(&self) -> Vec<ShownError> {
        self.shown
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl ErrorReporter for MemoryErrorReporter {
    fn show_error(&self, cause: &FailureCause, user_message: &str) -> Result<(), ReportError> {
        self.shown
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(ShownError {
                cause: cause.clone(),
                user_message: user_message.to_string(),
            });
        Ok(())
    }
}

/// Fallback notifier writing straight to the process's stderr handle.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrNotifier;

impl FallbackNotifier for StderrNotifier {
    fn notify_blocking(&self, title: &str, message: &str) {
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "*** {title} ***");
        let _ = writeln!(err, "{message}");
        let _ = err.flush();
    }
}

/// Notifier that records notices in memory.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    notices: Mutex<Vec<(String, String)>>,
}

impl MemoryNotifier {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `(title, message)` pairs in order.
    pub fn notices(&self) -> Vec<(String, String)> {
        self.notices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl FallbackNotifier for MemoryNotifier {
    fn notify_blocking(&self, title: &str, message: &str) {
        self.notices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((title.to_string(), message.to_string()));
    }
}

/// The error reporting service: logs through the sink first, then shows.
///
/// Used for failures a caller has already caught. Failures captured by the
/// exception funnel are logged and shown by the funnel itself.
#[derive(Clone)]
pub struct ErrorReporting {
    audit: AuditLog,
    reporter: Arc<dyn ErrorReporter>,
}

impl ErrorReporting {
    /// Creates the service.
    pub fn new(audit: AuditLog, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self { audit, reporter }
    }

    /// Returns the underlying reporter.
    pub fn reporter(&self) -> &Arc<dyn ErrorReporter> {
        &self.reporter
    }

    /// Logs `cause` at Error level under `category`, then notifies the user.
    /// Never fails; a reporter error is logged as a Warning.
    pub fn report(&self, cause: &FailureCause, user_message: &str, category: &str) {
        self.audit
            .log_error(user_message.to_string(), Some(cause.clone()), category);
        if let Err(error) = self.reporter.show_error(cause, user_message) {
            self.audit
                .log_warning(format!("error display failed: {error}"), category);
        }
    }
}

#[cfg(test)]
mod tests {
    use labhost_core::{LogLevel, ManualClock};
    use time::macros::datetime;

    use super::*;
    use crate::MemoryLogSink;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn console_reporter_renders_message_and_detail() {
        let buffer = SharedBuffer::default();
        let reporter = ConsoleErrorReporter::to_writer(Box::new(buffer.clone()));
        reporter
            .show_error(&FailureCause::new("io", "disk full"), "Could not save sample")
            .expect("writing to memory succeeds");

        let text = String::from_utf8(buffer.0.lock().expect("buffer lock").clone())
            .expect("utf8 output");
        assert!(text.contains("Could not save sample"));
        assert!(text.contains("io: disk full"));
    }

    #[test]
    fn reporting_logs_before_showing() {
        struct BrokenDisplay;
        impl ErrorReporter for BrokenDisplay {
            fn show_error(&self, _: &FailureCause, _: &str) -> Result<(), ReportError> {
                Err(ReportError::Unavailable("no window".to_string()))
            }
        }

        let sink = Arc::new(MemoryLogSink::new());
        let audit = AuditLog::new(
            sink.clone(),
            Arc::new(ManualClock::new(datetime!(2026-04-01 12:00 UTC))),
        );
        let reporting = ErrorReporting::new(audit, Arc::new(BrokenDisplay));

        reporting.report(&FailureCause::new("db", "timeout"), "Save failed", "Samples");

        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].level, LogLevel::Error);
        assert_eq!(entries[1].level, LogLevel::Warning);
        assert!(entries[1].message.contains("no window"));
    }
}
