//! Host lifecycle state machine.

use std::fmt;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use labhost_auth::AuthenticationGate;
use labhost_core::{CATEGORY_APPLICATION, FailureCause, SecurityPolicy};
use labhost_funnel::{BackgroundSpawner, FunnelRegistration, UiDispatcher, contain};
use labhost_logging::AuditLog;

use crate::monitor::PerformanceMonitor;
use crate::services::{Disposer, HostParts, ServiceHost};
use crate::storage::{StorageError, StorageInitializer, StorageStatus};
use crate::{APP_VERSION, HostError};

/// Title of the blocking notice shown when startup cannot continue.
pub const FATAL_TITLE: &str = "labhost - cannot start";

/// Lifecycle phases of the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostState {
    /// Created, nothing built.
    Unstarted,
    /// Constructing the service graph.
    Building,
    /// Preparing durable storage.
    Initializing,
    /// Capture points active; login flow may run.
    Running,
    /// Releasing monitor, capture points and services.
    ShuttingDown,
    /// Terminal after an orderly shutdown.
    Stopped,
    /// Terminal after a fatal startup failure.
    Failed,
}

impl HostState {
    fn can_advance_to(self, next: HostState) -> bool {
        matches!(
            (self, next),
            (HostState::Unstarted, HostState::Building)
                | (HostState::Building, HostState::Initializing)
                | (HostState::Building, HostState::Failed)
                | (HostState::Initializing, HostState::Running)
                | (HostState::Initializing, HostState::Failed)
                | (HostState::Running, HostState::ShuttingDown)
                | (HostState::ShuttingDown, HostState::Stopped)
        )
    }
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Outcome of one shutdown step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Step returned normally.
    Completed,
    /// Step returned an error or panicked.
    Failed(FailureCause),
    /// Step did not finish within the step budget and was abandoned.
    TimedOut,
}

/// One executed shutdown step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownStep {
    /// Step name.
    pub name: String,
    /// How it ended.
    pub outcome: StepOutcome,
}

/// Ordered record of every shutdown step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Steps in execution order.
    pub steps: Vec<ShutdownStep>,
}

impl ShutdownReport {
    /// Returns `true` when every step completed.
    pub fn is_clean(&self) -> bool {
        self.steps
            .iter()
            .all(|step| step.outcome == StepOutcome::Completed)
    }

    /// Step names in execution order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.name.as_str()).collect()
    }

    fn push(&mut self, name: &str, outcome: StepOutcome) {
        self.steps.push(ShutdownStep {
            name: name.to_string(),
            outcome,
        });
    }
}

/// Builds, runs and tears down the host.
///
/// Collaborators are passed in explicitly; nothing is looked up globally.
pub struct HostLifecycleController {
    state: HostState,
    history: Vec<HostState>,
    parts: HostParts,
    policy: Arc<SecurityPolicy>,
    storage: Arc<dyn StorageInitializer>,
    monitor: Arc<dyn PerformanceMonitor>,
    step_timeout: Duration,
    services: Option<ServiceHost>,
    registration: Option<FunnelRegistration>,
}

impl HostLifecycleController {
    /// Creates an unstarted controller.
    pub fn new(
        parts: HostParts,
        policy: SecurityPolicy,
        storage: Arc<dyn StorageInitializer>,
        monitor: Arc<dyn PerformanceMonitor>,
    ) -> Self {
        Self {
            state: HostState::Unstarted,
            history: vec![HostState::Unstarted],
            parts,
            policy: Arc::new(policy),
            storage,
            monitor,
            step_timeout: Duration::from_millis(labhost_core::policy::DEFAULT_SHUTDOWN_STEP_TIMEOUT_MS),
            services: None,
            registration: None,
        }
    }

    /// Overrides the per-step shutdown budget.
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Current phase.
    pub fn state(&self) -> HostState {
        self.state
    }

    /// Every phase entered so far, in order.
    pub fn history(&self) -> &[HostState] {
        &self.history
    }

    /// Service graph, available from `Initializing` until shutdown.
    pub fn services(&self) -> Option<&ServiceHost> {
        self.services.as_ref()
    }

    /// Logging facade, available while services exist.
    pub fn audit(&self) -> Option<&AuditLog> {
        self.services.as_ref().map(ServiceHost::audit)
    }

    /// Authentication gate handed to the login flow.
    pub fn gate(&self) -> Option<Arc<AuthenticationGate>> {
        self.services.as_ref().map(|services| Arc::clone(services.gate()))
    }

    /// UI capture point; only available while running.
    pub fn ui_dispatcher(&self) -> Option<UiDispatcher> {
        self.registration
            .as_ref()
            .map(FunnelRegistration::ui_dispatcher)
    }

    /// Background capture point; only available while running.
    pub fn background(&self) -> Option<BackgroundSpawner> {
        self.registration.as_ref().map(FunnelRegistration::background)
    }

    /// Registers an application service for reverse-order disposal.
    ///
    /// # Errors
    /// Returns [`HostError::IllegalTransition`] unless the host is running.
    pub fn register_service(&mut self, name: &'static str, disposer: Disposer) -> Result<(), HostError> {
        match (self.state, self.services.as_mut()) {
            (HostState::Running, Some(services)) => {
                services.register(name, disposer);
                Ok(())
            }
            _ => Err(HostError::IllegalTransition {
                from: self.state,
                to: HostState::Running,
            }),
        }
    }

    /// Builds services, initializes storage and enters `Running`.
    ///
    /// # Errors
    /// Returns [`HostError::StorageUnavailable`] when storage cannot be
    /// prepared; the host is then `Failed` and the blocking notice has been
    /// shown. Other startup failures end the same way with their own variant.
    pub fn start(&mut self) -> Result<StorageStatus, HostError> {
        self.advance(HostState::Building)?;
        let parts = self.parts.clone();
        let policy = Arc::clone(&self.policy);
        let services = match contain(move || ServiceHost::build(parts, policy)) {
            Ok(services) => services,
            Err(cause) => return Err(self.fail(HostError::Startup(cause))),
        };
        self.services = Some(services);

        self.advance(HostState::Initializing)?;
        let storage = Arc::clone(&self.storage);
        let status = match contain(move || storage.initialize()) {
            Ok(Ok(status)) => status,
            Ok(Err(error)) => return Err(self.fail(HostError::StorageUnavailable(error))),
            Err(cause) => {
                let error = StorageError::Unavailable(cause.summary());
                return Err(self.fail(HostError::StorageUnavailable(error)));
            }
        };
        tracing::info!(?status, "storage ready");

        let Some(funnel) = self.services.as_ref().map(|services| Arc::clone(services.funnel())) else {
            return Err(self.fail(HostError::IllegalTransition {
                from: HostState::Initializing,
                to: HostState::Running,
            }));
        };
        match FunnelRegistration::install(funnel) {
            Ok(registration) => self.registration = Some(registration),
            Err(error) => return Err(self.fail(HostError::Funnel(error))),
        }
        self.advance(HostState::Running)?;

        let monitor = Arc::clone(&self.monitor);
        if let Some(audit) = self.audit() {
            match contain(move || monitor.start()) {
                Ok(Ok(())) => {}
                Ok(Err(error)) => audit.log_warning(
                    format!("performance monitor did not start: {error}"),
                    CATEGORY_APPLICATION,
                ),
                Err(cause) => audit.log_warning(
                    format!("performance monitor did not start: {}", cause.summary()),
                    CATEGORY_APPLICATION,
                ),
            }
            audit.log_info(
                format!("Application started (version {APP_VERSION})"),
                CATEGORY_APPLICATION,
            );
        }
        Ok(status)
    }

    /// Runs main-thread work while the host is `Running`.
    ///
    /// A panic in `session` goes through the process-domain capture point
    /// as a terminating failure, so it is logged but not reported.
    ///
    /// # Errors
    /// Returns [`HostError::IllegalTransition`] unless the host is running
    /// and [`HostError::Session`] when `session` panics.
    pub fn run_session<T>(&self, session: impl FnOnce() -> T) -> Result<T, HostError> {
        if self.state != HostState::Running {
            return Err(HostError::IllegalTransition {
                from: self.state,
                to: HostState::Running,
            });
        }
        contain(session).map_err(|cause| {
            match &self.registration {
                Some(registration) => {
                    registration.report_process_failure(cause.clone(), true);
                }
                None => tracing::error!(cause = %cause.summary(), "session failed without capture points"),
            }
            HostError::Session(cause)
        })
    }

    /// Stops monitoring, removes the capture points and disposes services
    /// in reverse construction order.
    ///
    /// Every step runs under its own guard and time budget; a failing or
    /// hung step is logged and the remaining steps still run.
    ///
    /// # Errors
    /// Returns [`HostError::IllegalTransition`] unless the host is running.
    pub fn shutdown(&mut self) -> Result<ShutdownReport, HostError> {
        self.advance(HostState::ShuttingDown)?;
        let timeout = self.step_timeout;
        let audit = self.audit().cloned();
        if let Some(audit) = &audit {
            audit.log_info("Application shutting down", CATEGORY_APPLICATION);
        }

        let mut report = ShutdownReport::default();
        let mut run = |name: &str, step: Disposer| {
            let outcome = run_bounded(timeout, step);
            if let Some(audit) = &audit {
                log_step_outcome(audit, name, &outcome);
            }
            report.push(name, outcome);
        };

        let monitor = Arc::clone(&self.monitor);
        run("performance monitor stop", monitor_step(&monitor, |m| m.stop()));
        run("performance monitor cleanup", monitor_step(&monitor, |m| m.cleanup()));
        run("performance monitor dispose", monitor_step(&monitor, |m| m.dispose()));

        if let Some(registration) = self.registration.take() {
            run(
                "failure capture points",
                Box::new(move || {
                    registration.uninstall(timeout);
                    Ok(())
                }),
            );
        }

        if let Some(services) = self.services.take() {
            for (name, disposer) in services.into_disposal_order() {
                run(name, disposer);
            }
        }

        self.advance(HostState::Stopped)?;
        tracing::info!(clean = report.is_clean(), steps = report.steps.len(), "host stopped");
        Ok(report)
    }

    fn advance(&mut self, next: HostState) -> Result<(), HostError> {
        if !self.state.can_advance_to(next) {
            return Err(HostError::IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(from = %self.state, to = %next, "host state change");
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    /// Enters `Failed` and shows the blocking notice. Capture points are not
    /// active yet, so the notice is the only report.
    fn fail(&mut self, error: HostError) -> HostError {
        if self.advance(HostState::Failed).is_err() {
            self.state = HostState::Failed;
            self.history.push(HostState::Failed);
        }
        self.services = None;
        tracing::error!(%error, "host startup failed");

        let notifier = Arc::clone(&self.parts.notifier);
        let message = format!("{error}\n\nThe application will now exit.");
        let _ = contain(move || notifier.notify_blocking(FATAL_TITLE, &message));
        error
    }
}

fn monitor_step(
    monitor: &Arc<dyn PerformanceMonitor>,
    action: fn(&dyn PerformanceMonitor) -> Result<(), crate::MonitorError>,
) -> Disposer {
    let monitor = Arc::clone(monitor);
    Box::new(move || action(monitor.as_ref()).map_err(|error| FailureCause::from_error(&error)))
}

fn log_step_outcome(audit: &AuditLog, name: &str, outcome: &StepOutcome) {
    match outcome {
        StepOutcome::Completed => {}
        StepOutcome::Failed(cause) => audit.log_error(
            format!("shutdown step '{name}' failed; continuing"),
            Some(cause.clone()),
            CATEGORY_APPLICATION,
        ),
        StepOutcome::TimedOut => audit.log_warning(
            format!("shutdown step '{name}' timed out; continuing"),
            CATEGORY_APPLICATION,
        ),
    }
}

/// Runs `step` on a helper thread and waits at most `timeout` for it.
///
/// A step that never returns is abandoned on its thread.
pub fn run_bounded(timeout: Duration, step: Disposer) -> StepOutcome {
    let (done, outcome) = mpsc::sync_channel(1);
    let spawned = std::thread::Builder::new()
        .name("labhost-shutdown-step".to_string())
        .spawn(move || {
            let outcome = match contain(step) {
                Ok(Ok(())) => StepOutcome::Completed,
                Ok(Err(cause)) | Err(cause) => StepOutcome::Failed(cause),
            };
            let _ = done.send(outcome);
        });
    if let Err(error) = spawned {
        return StepOutcome::Failed(FailureCause::from_error(&error));
    }

    match outcome.recv_timeout(timeout) {
        Ok(outcome) => outcome,
        Err(RecvTimeoutError::Timeout) => StepOutcome::TimedOut,
        Err(RecvTimeoutError::Disconnected) => {
            StepOutcome::Failed(FailureCause::new("shutdown", "step ended without reporting"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_forward_transitions_are_legal() {
        assert!(HostState::Unstarted.can_advance_to(HostState::Building));
        assert!(HostState::Initializing.can_advance_to(HostState::Failed));
        assert!(!HostState::Building.can_advance_to(HostState::Running));
        assert!(!HostState::Stopped.can_advance_to(HostState::Building));
        assert!(!HostState::Failed.can_advance_to(HostState::Running));
        assert!(!HostState::Stopped.can_advance_to(HostState::ShuttingDown));
    }

    #[test]
    fn bounded_step_reports_each_outcome() {
        let budget = Duration::from_millis(200);
        assert_eq!(run_bounded(budget, Box::new(|| Ok(()))), StepOutcome::Completed);

        let failed = run_bounded(
            budget,
            Box::new(|| Err(FailureCause::new("io", "flush failed"))),
        );
        assert!(matches!(failed, StepOutcome::Failed(cause) if cause.message == "flush failed"));

        let panicked = run_bounded(budget, Box::new(|| -> Result<(), FailureCause> { panic!("dispose blew up") }));
        assert!(matches!(panicked, StepOutcome::Failed(cause) if cause.message == "dispose blew up"));

        let hung = run_bounded(
            Duration::from_millis(20),
            Box::new(|| {
                std::thread::sleep(Duration::from_millis(500));
                Ok(())
            }),
        );
        assert_eq!(hung, StepOutcome::TimedOut);
    }
}
