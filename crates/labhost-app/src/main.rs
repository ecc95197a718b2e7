#![warn(missing_docs)]
//! # labhost-app binary
//!
//! Console entry point for the labhost host.

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use labhost_app::{
    ConsoleExit, ConsoleLogin, DirectoryStorageInitializer, EXIT_FAILURE, EXIT_OK, FATAL_TITLE,
    HostError, HostLifecycleController, HostParts, SamplingPerformanceMonitor, StepOutcome,
    app_version,
};
use labhost_auth::{Account, AccountRole, InMemoryCredentialStore};
use labhost_core::{AppSettings, Clock, SecurityPolicy, SystemClock};
use labhost_funnel::contain;
use labhost_logging::{
    AsyncLogSink, ConsoleErrorReporter, DEFAULT_QUEUE_CAPACITY, FallbackNotifier, FileLogSink,
    StderrNotifier,
};

const DEFAULT_LOG_DIRECTORY: &str = "logs";
const DEFAULT_DATA_DIRECTORY: &str = "data";
const SEED_ADMINISTRATOR: &str = "admin";
const MONITOR_INTERVAL: Duration = Duration::from_secs(30);
const LOG_DRAIN_BUDGET: Duration = Duration::from_secs(2);

/// CLI entry point.
fn main() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Covers startup and teardown; the running session has its own guard.
    let code = match contain(run) {
        Ok(Ok(())) => EXIT_OK,
        Ok(Err(error)) => {
            tracing::error!(%error, exit_code = error.exit_code(), "labhost exiting");
            error.exit_code()
        }
        Err(cause) => {
            tracing::error!(cause = %cause.summary(), "unrecoverable failure outside the host");
            StderrNotifier.notify_blocking(FATAL_TITLE, &cause.to_string());
            EXIT_FAILURE
        }
    };
    std::process::exit(code);
}

fn run() -> Result<(), HostError> {
    let settings = AppSettings::load_default()?;
    let policy = SecurityPolicy::from_settings(&settings)?;
    tracing::info!(version = app_version(), ?policy, "labhost starting");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let log_dir = settings
        .logging
        .directory
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIRECTORY));
    let file = FileLogSink::create_in(&log_dir, clock.now())?;
    tracing::info!(path = %file.path().display(), "log file created");
    let sink = Arc::new(AsyncLogSink::spawn(Arc::new(file), DEFAULT_QUEUE_CAPACITY)?);

    let store = Arc::new(InMemoryCredentialStore::new());
    if store.is_empty() {
        store.insert(
            Account {
                id: SEED_ADMINISTRATOR.to_string(),
                display_name: "Administrator".to_string(),
                role: AccountRole::Administrator,
            },
            &policy.default_reset_password,
        );
        tracing::warn!(
            account = SEED_ADMINISTRATOR,
            "no accounts found; seeded administrator with the default reset password"
        );
    }

    let data_dir = settings
        .storage
        .data_directory
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIRECTORY));
    let parts = HostParts {
        sink: sink.clone(),
        reporter: Arc::new(ConsoleErrorReporter::stderr()),
        notifier: Arc::new(StderrNotifier),
        clock,
        store,
    };
    let mut host = HostLifecycleController::new(
        parts,
        policy,
        Arc::new(DirectoryStorageInitializer::new(data_dir)),
        Arc::new(SamplingPerformanceMonitor::new(MONITOR_INTERVAL)),
    )
    .with_step_timeout(Duration::from_millis(settings.shutdown_step_timeout_ms()));

    println!("labhost {}", app_version());
    host.start()?;

    let session = match (host.gate(), host.ui_dispatcher()) {
        (Some(gate), Some(ui)) => host.run_session(|| {
            let exit = ConsoleLogin::new(io::stdin().lock(), io::stdout()).run(&gate, &ui);
            match exit {
                Ok(ConsoleExit::SignedIn(account)) => {
                    println!("signed in as {}; press Enter to sign out", account.id);
                    let mut line = String::new();
                    let _ = io::stdin().lock().read_line(&mut line);
                }
                Ok(ConsoleExit::EndOfInput) => tracing::info!("login input closed"),
                Err(error) => tracing::warn!(%error, "login console failed"),
            }
        }),
        _ => Ok(()),
    };

    let report = host.shutdown()?;
    for step in &report.steps {
        if step.outcome != StepOutcome::Completed {
            tracing::warn!(step = %step.name, outcome = ?step.outcome, "shutdown step did not complete");
        }
    }
    if !sink.shutdown(LOG_DRAIN_BUDGET) {
        tracing::warn!("log writer did not drain before exit");
    }
    session
}
