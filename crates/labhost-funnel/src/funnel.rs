//! The shared forwarding algorithm behind all three capture points.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use labhost_core::{Clock, FailureCause, FailureEvent, FailureSource};
use labhost_logging::{ErrorReporter, FallbackNotifier, LogSink};

use crate::scope::CaptureScope;

/// Title of the last-resort notice.
pub const FALLBACK_TITLE: &str = "labhost - unexpected error";

/// How one captured failure was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Logged and shown to the user.
    Reported,
    /// Logged only; the process was already terminating.
    LoggedOnly,
    /// Logging or reporting failed; the fallback notice was attempted.
    FellBack,
}

/// One method per failure-producing execution context.
pub trait FailureHandler: Send + Sync {
    /// Failure raised on the UI event loop. The loop keeps running.
    fn on_ui_thread_failure(&self, cause: FailureCause) -> Disposition;

    /// Failure on a thread no other capture point covers.
    fn on_process_failure(&self, cause: FailureCause, terminating: bool) -> Disposition;

    /// Failure in detached background work.
    fn on_background_failure(&self, cause: FailureCause) -> Disposition;
}

/// Counters describing funnel activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FunnelStats {
    /// Failures captured on the UI thread.
    pub ui_thread: u64,
    /// Failures captured process-wide.
    pub process_domain: u64,
    /// Failures captured from background work.
    pub background_task: u64,
    /// Forwards that ended on the fallback path.
    pub fell_back: u64,
}

#[derive(Debug, Default)]
struct Counters {
    ui_thread: AtomicU64,
    process_domain: AtomicU64,
    background_task: AtomicU64,
    fell_back: AtomicU64,
}

/// Routes captured failures to the logging sink and error reporter.
///
/// Forwarding is re-entrant: concurrent failures from different contexts are
/// forwarded independently, relying only on the sink's own concurrency
/// guarantees. Nothing raised while forwarding escapes [`Self::forward`].
pub struct ExceptionFunnel {
    sink: Arc<dyn LogSink>,
    reporter: Arc<dyn ErrorReporter>,
    notifier: Arc<dyn FallbackNotifier>,
    clock: Arc<dyn Clock>,
    counters: Counters,
}

impl ExceptionFunnel {
    /// Creates a funnel over its collaborators.
    pub fn new(
        sink: Arc<dyn LogSink>,
        reporter: Arc<dyn ErrorReporter>,
        notifier: Arc<dyn FallbackNotifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sink,
            reporter,
            notifier,
            clock,
            counters: Counters::default(),
        }
    }

    /// Returns a snapshot of the activity counters.
    pub fn stats(&self) -> FunnelStats {
        FunnelStats {
            ui_thread: self.counters.ui_thread.load(Ordering::Relaxed),
            process_domain: self.counters.process_domain.load(Ordering::Relaxed),
            background_task: self.counters.background_task.load(Ordering::Relaxed),
            fell_back: self.counters.fell_back.load(Ordering::Relaxed),
        }
    }

    /// Logs the event, shows it to the user unless the process is
    /// terminating, and falls back to the blocking notice when either step
    /// fails. Never panics.
    pub fn forward(&self, event: FailureEvent) -> Disposition {
        let _scope = CaptureScope::enter();
        self.count(event.source);

        let secondary = match catch_unwind(AssertUnwindSafe(|| self.log_and_report(&event))) {
            Ok(Ok(disposition)) => return disposition,
            Ok(Err(secondary)) => secondary,
            Err(payload) => FailureCause::from_panic(payload.as_ref()),
        };

        self.counters.fell_back.fetch_add(1, Ordering::Relaxed);
        let notice = format!(
            "{}\n\nThe error could not be recorded normally: {}",
            user_message(&event),
            secondary.message
        );
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.notifier.notify_blocking(FALLBACK_TITLE, &notice);
        }));
        Disposition::FellBack
    }

    fn log_and_report(&self, event: &FailureEvent) -> Result<Disposition, FailureCause> {
        self.sink
            .write(event.to_log_entry())
            .map_err(|error| FailureCause::from_error(&error))?;

        if event.source == FailureSource::ProcessDomain && event.terminating {
            return Ok(Disposition::LoggedOnly);
        }

        self.reporter
            .show_error(&event.cause, &user_message(event))
            .map_err(|error| FailureCause::from_error(&error))?;
        Ok(Disposition::Reported)
    }

    fn count(&self, source: FailureSource) {
        let counter = match source {
            FailureSource::UiThread => &self.counters.ui_thread,
            FailureSource::ProcessDomain => &self.counters.process_domain,
            FailureSource::BackgroundTask => &self.counters.background_task,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn event(&self, source: FailureSource, cause: FailureCause) -> FailureEvent {
        FailureEvent::new(source, cause, self.clock.now())
    }
}

impl FailureHandler for ExceptionFunnel {
    fn on_ui_thread_failure(&self, cause: FailureCause) -> Disposition {
        self.forward(self.event(FailureSource::UiThread, cause))
    }

    fn on_process_failure(&self, cause: FailureCause, terminating: bool) -> Disposition {
        self.forward(
            self.event(FailureSource::ProcessDomain, cause)
                .terminating(terminating),
        )
    }

    fn on_background_failure(&self, cause: FailureCause) -> Disposition {
        self.forward(self.event(FailureSource::BackgroundTask, cause))
    }
}

/// Text shown to the user for a captured failure.
pub fn user_message(event: &FailureEvent) -> String {
    let context = match event.source {
        FailureSource::UiThread => "the user interface",
        FailureSource::ProcessDomain => "the application",
        FailureSource::BackgroundTask => "a background task",
    };
    format!(
        "An unexpected error occurred in {context}: {}. The application will keep running.",
        event.cause.message
    )
}
