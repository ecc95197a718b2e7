//! The three capture points and their registration.

use std::panic::{self, AssertUnwindSafe, PanicHookInfo, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use labhost_core::{FailureCause, FailureSource};

use crate::scope::{self, CaptureScope};
use crate::{Disposition, FailureHandler, FunnelError};

/// How long a terminating thread waits for its failure to be logged.
pub const TERMINATION_LOG_BUDGET: Duration = Duration::from_secs(2);

static HOOK_INSTALLED: AtomicBool = AtomicBool::new(false);

type PanicHook = Box<dyn Fn(&PanicHookInfo<'_>) + Sync + Send + 'static>;

/// Capture point for the UI event loop.
///
/// Every UI callback runs through [`UiDispatcher::run`] or
/// [`UiDispatcher::run_fallible`]; a failure is forwarded and marked handled
/// so the loop continues.
#[derive(Clone)]
pub struct UiDispatcher {
    handler: Arc<dyn FailureHandler>,
}

impl UiDispatcher {
    /// Creates a dispatcher forwarding to `handler`.
    pub fn new(handler: Arc<dyn FailureHandler>) -> Self {
        Self { handler }
    }

    /// Runs one UI action. Returns `None` when it panicked.
    pub fn run<T>(&self, action: impl FnOnce() -> T) -> Option<T> {
        match scope::contain(action) {
            Ok(value) => Some(value),
            Err(cause) => {
                self.handler.on_ui_thread_failure(cause);
                None
            }
        }
    }

    /// Runs one fallible UI action. Returns `None` when it failed or panicked.
    pub fn run_fallible<T, E>(&self, action: impl FnOnce() -> Result<T, E>) -> Option<T>
    where
        E: std::error::Error,
    {
        match scope::contain(action) {
            Ok(Ok(value)) => Some(value),
            Ok(Err(error)) => {
                self.handler
                    .on_ui_thread_failure(FailureCause::from_error(&error));
                None
            }
            Err(cause) => {
                self.handler.on_ui_thread_failure(cause);
                None
            }
        }
    }
}

/// Capture point for detached background work.
///
/// Failures are observed on the worker thread itself and forwarded; they
/// never propagate to a joiner.
#[derive(Clone)]
pub struct BackgroundSpawner {
    handler: Arc<dyn FailureHandler>,
}

impl BackgroundSpawner {
    /// Creates a spawner forwarding to `handler`.
    pub fn new(handler: Arc<dyn FailureHandler>) -> Self {
        Self { handler }
    }

    /// Spawns `work` on a named thread.
    ///
    /// # Errors
    /// Returns [`FunnelError::Spawn`] when the OS refuses a new thread.
    pub fn spawn<F>(&self, name: &str, work: F) -> Result<JoinHandle<()>, FunnelError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawn_fallible(name, move || {
            work();
            Ok::<(), std::convert::Infallible>(())
        })
    }

    /// Spawns fallible `work`; an `Err` is forwarded like a panic.
    ///
    /// # Errors
    /// Returns [`FunnelError::Spawn`] when the OS refuses a new thread.
    pub fn spawn_fallible<F, E>(&self, name: &str, work: F) -> Result<JoinHandle<()>, FunnelError>
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
        E: std::error::Error + 'static,
    {
        let handler = Arc::clone(&self.handler);
        std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let failure = match scope::contain(work) {
                    Ok(Ok(())) => None,
                    Ok(Err(error)) => Some(FailureCause::from_error(&error)),
                    Err(cause) => Some(cause),
                };
                if let Some(cause) = failure {
                    handler.on_background_failure(cause);
                }
            })
            .map_err(FunnelError::Spawn)
    }
}

struct RelayedFailure {
    cause: FailureCause,
    terminating: bool,
    ack: Option<SyncSender<Disposition>>,
}

/// Hands process-wide failures from the panic hook to a dedicated thread.
///
/// A panic hook runs while its thread is already panicking, so a second panic
/// there would abort the process. Forwarding therefore happens on the relay
/// thread, where the funnel's own guard applies.
struct ProcessRelay {
    sender: Mutex<Option<Sender<RelayedFailure>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ProcessRelay {
    fn spawn(handler: Arc<dyn FailureHandler>) -> Result<Self, FunnelError> {
        let (sender, receiver) = mpsc::channel::<RelayedFailure>();
        let worker = std::thread::Builder::new()
            .name("labhost-failure-relay".to_string())
            .spawn(move || run_relay(&receiver, handler.as_ref()))
            .map_err(FunnelError::Spawn)?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Queues a failure; a terminating caller waits up to
    /// [`TERMINATION_LOG_BUDGET`] for it to be handled.
    fn submit(&self, cause: FailureCause, terminating: bool) -> Option<Disposition> {
        let (ack, wait) = if terminating {
            let (tx, rx) = mpsc::sync_channel(1);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()?;
        sender
            .send(RelayedFailure {
                cause,
                terminating,
                ack,
            })
            .ok()?;

        wait.and_then(|rx| rx.recv_timeout(TERMINATION_LOG_BUDGET).ok())
    }

    fn close(&self, timeout: Duration) {
        drop(
            self.sender
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take(),
        );
        let Some(worker) = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        else {
            return;
        };

        let deadline = Instant::now() + timeout;
        while !worker.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        if worker.is_finished() {
            let _ = worker.join();
        }
    }
}

fn run_relay(receiver: &Receiver<RelayedFailure>, handler: &dyn FailureHandler) {
    while let Ok(failure) = receiver.recv() {
        let _scope = CaptureScope::enter();
        let disposition = catch_unwind(AssertUnwindSafe(|| {
            handler.on_process_failure(failure.cause, failure.terminating)
        }))
        .unwrap_or(Disposition::FellBack);
        if let Some(ack) = failure.ack {
            let _ = ack.try_send(disposition);
        }
    }
}

/// Active registration of all three capture points.
///
/// Created when the host enters its running state; dropping it restores the
/// previous panic hook.
pub struct FunnelRegistration {
    handler: Arc<dyn FailureHandler>,
    relay: Arc<ProcessRelay>,
    previous_hook: Mutex<Option<PanicHook>>,
    active: AtomicBool,
}

impl FunnelRegistration {
    /// Installs the process-wide hook and prepares the UI and background
    /// capture points.
    ///
    /// # Errors
    /// Returns [`FunnelError::AlreadyInstalled`] when another registration is
    /// active, or [`FunnelError::Spawn`] when the relay thread cannot start.
    pub fn install(handler: Arc<dyn FailureHandler>) -> Result<Self, FunnelError> {
        if HOOK_INSTALLED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(FunnelError::AlreadyInstalled);
        }

        let relay = match ProcessRelay::spawn(Arc::clone(&handler)) {
            Ok(relay) => Arc::new(relay),
            Err(error) => {
                HOOK_INSTALLED.store(false, Ordering::Release);
                return Err(error);
            }
        };

        let previous_hook = panic::take_hook();
        let hook_relay = Arc::clone(&relay);
        panic::set_hook(Box::new(move |info| process_panic_hook(&hook_relay, info)));
        tracing::debug!("failure funnel capture points registered");

        Ok(Self {
            handler,
            relay,
            previous_hook: Mutex::new(Some(previous_hook)),
            active: AtomicBool::new(true),
        })
    }

    /// Sources covered by this registration.
    pub fn capture_points(&self) -> [FailureSource; 3] {
        [
            FailureSource::UiThread,
            FailureSource::ProcessDomain,
            FailureSource::BackgroundTask,
        ]
    }

    /// UI event-loop capture point.
    pub fn ui_dispatcher(&self) -> UiDispatcher {
        UiDispatcher::new(Arc::clone(&self.handler))
    }

    /// Background-work capture point.
    pub fn background(&self) -> BackgroundSpawner {
        BackgroundSpawner::new(Arc::clone(&self.handler))
    }

    /// Routes a process-wide failure exactly as the panic hook does.
    pub fn report_process_failure(
        &self,
        cause: FailureCause,
        terminating: bool,
    ) -> Option<Disposition> {
        self.relay.submit(cause, terminating)
    }

    /// Restores the previous panic hook and stops the relay within `timeout`.
    pub fn uninstall(&self, timeout: Duration) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }

        if !std::thread::panicking() {
            let previous = self
                .previous_hook
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take();
            let _ours = panic::take_hook();
            if let Some(previous) = previous {
                panic::set_hook(previous);
            }
        }
        self.relay.close(timeout);
        HOOK_INSTALLED.store(false, Ordering::Release);
        tracing::debug!("failure funnel capture points removed");
    }
}

impl Drop for FunnelRegistration {
    fn drop(&mut self) {
        self.uninstall(TERMINATION_LOG_BUDGET);
    }
}

fn process_panic_hook(relay: &ProcessRelay, info: &PanicHookInfo<'_>) {
    let location = info
        .location()
        .map(|location| format!("{}:{}:{}", location.file(), location.line(), location.column()));

    if scope::in_capture_scope() {
        scope::note_panic_location(location);
        return;
    }

    let mut cause = FailureCause::from_panic(info.payload());
    cause.location = location;
    let terminating = std::thread::current().name() == Some("main");
    relay.submit(cause, terminating);
}

#[cfg(test)]
mod tests {
    use std::io;

    use labhost_core::ManualClock;
    use labhost_logging::{MemoryErrorReporter, MemoryLogSink, MemoryNotifier};
    use time::macros::datetime;

    use super::*;
    use crate::ExceptionFunnel;

    fn funnel() -> (Arc<ExceptionFunnel>, Arc<MemoryLogSink>, Arc<MemoryErrorReporter>) {
        let sink = Arc::new(MemoryLogSink::new());
        let reporter = Arc::new(MemoryErrorReporter::new());
        let funnel = Arc::new(ExceptionFunnel::new(
            sink.clone(),
            reporter.clone(),
            Arc::new(MemoryNotifier::new()),
            Arc::new(ManualClock::new(datetime!(2026-02-14 10:00 UTC))),
        ));
        (funnel, sink, reporter)
    }

    #[test]
    fn ui_dispatcher_marks_failures_handled() {
        let (funnel, sink, reporter) = funnel();
        let ui = UiDispatcher::new(funnel.clone());

        assert_eq!(ui.run(|| "rendered"), Some("rendered"));
        assert_eq!(ui.run(|| -> u8 { panic!("grid row out of range") }), None);
        assert_eq!(
            ui.run_fallible(|| Err::<(), _>(io::Error::other("printer offline"))),
            None
        );

        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].message.contains("grid row out of range"));
        assert!(entries[1].message.contains("printer offline"));
        assert_eq!(reporter.shown().len(), 2);
        assert_eq!(funnel.stats().ui_thread, 2);
    }

    #[test]
    fn background_failures_are_observed_on_the_worker() {
        let (funnel, sink, _) = funnel();
        let spawner = BackgroundSpawner::new(funnel.clone());

        let handle = spawner
            .spawn("panicking-job", || panic!("instrument feed closed"))
            .expect("thread spawns");
        handle.join().expect("panic never escapes the worker");

        let handle = spawner
            .spawn_fallible("failing-job", || Err(io::Error::other("export failed")))
            .expect("thread spawns");
        handle.join().expect("error never escapes the worker");

        let handle = spawner.spawn("quiet-job", || {}).expect("thread spawns");
        handle.join().expect("clean exit");

        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|entry| entry.message.contains("BackgroundTask")));
        assert_eq!(funnel.stats().background_task, 2);
    }

    #[test]
    fn relay_waits_for_terminating_failures() {
        let (funnel, sink, reporter) = funnel();
        let relay = ProcessRelay::spawn(funnel).expect("relay spawns");

        let disposition = relay.submit(FailureCause::new("panic", "main exited"), true);
        assert_eq!(disposition, Some(Disposition::LoggedOnly));
        assert_eq!(sink.len(), 1);
        assert!(reporter.shown().is_empty());

        relay.close(Duration::from_secs(2));
        assert_eq!(relay.submit(FailureCause::new("panic", "late"), false), None);
    }
}
