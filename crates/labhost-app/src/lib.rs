#![warn(missing_docs)]
//! # labhost-app
//!
//! ## Purpose
//! Wires the `labhost` core together and drives it from startup to
//! shutdown.
//!
//! ## Responsibilities
//! - Construct the service graph leaves first and own its disposal
//!   ([`ServiceHost`]).
//! - Prepare durable storage before anything else runs; a failure here is
//!   fatal ([`StorageInitializer`]).
//! - Activate the failure funnel capture points, start monitoring and log
//!   startup ([`HostLifecycleController::start`]).
//! - Tear down in bounded, individually guarded steps
//!   ([`HostLifecycleController::shutdown`]).
//! - Run the console login flow standing in for the login window
//!   ([`ConsoleLogin`]).
//!
//! ## Data flow
//! configuration -> [`HostParts`] + policy -> controller `start` ->
//! login flow against the authentication gate -> `shutdown` ->
//! [`ShutdownReport`] -> process exit code.
//!
//! ## Ownership and lifetimes
//! The controller owns the [`ServiceHost`] from `Building` until
//! `ShuttingDown`; services are released exactly once, newest first.
//!
//! ## Error model
//! Startup failures are [`HostError`] values mapped onto exit codes by
//! [`HostError::exit_code`]. Shutdown never fails; step failures are
//! recorded in the report and the log.
//!
//! ## Security and privacy notes
//! - Secrets read by the console flow are passed to the gate and dropped.
//! - Configuration debug output redacts the default reset password.

mod console;
mod lifecycle;
mod monitor;
mod services;
mod storage;

use labhost_core::{CoreError, FailureCause};
use labhost_funnel::FunnelError;
use labhost_logging::LogSinkError;
use thiserror::Error;

pub use console::{ConsoleExit, ConsoleLogin, render_outcome};
pub use lifecycle::{
    FATAL_TITLE, HostLifecycleController, HostState, ShutdownReport, ShutdownStep, StepOutcome,
    run_bounded,
};
pub use monitor::{
    MonitorError, NullPerformanceMonitor, PerformanceMonitor, PerformanceSample,
    SAMPLE_HISTORY, SamplingPerformanceMonitor,
};
pub use services::{Disposer, HostParts, ServiceHost};
pub use storage::{
    DirectoryStorageInitializer, SCHEMA_MARKER_FILE, STORAGE_SCHEMA_VERSION, StorageError,
    StorageInitializer, StorageStatus,
};

/// Build-time application version loaded from root `VERSION` file.
pub const APP_VERSION: &str = env!("LABHOST_VERSION");

/// Exit code after an orderly shutdown.
pub const EXIT_OK: i32 = 0;
/// Exit code for unrecoverable failures other than storage.
pub const EXIT_FAILURE: i32 = 1;
/// Exit code when durable storage is unavailable.
pub const EXIT_STORAGE_UNAVAILABLE: i32 = 2;

/// Returns the app version sourced from root `VERSION`.
pub fn app_version() -> &'static str {
    APP_VERSION
}

/// Host-level errors.
#[derive(Debug, Error)]
pub enum HostError {
    /// Settings or policy could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] CoreError),
    /// The log file could not be opened.
    #[error("log sink unavailable: {0}")]
    LogSink(#[from] LogSinkError),
    /// Durable storage could not be prepared.
    #[error("storage initialization failed: {0}")]
    StorageUnavailable(#[source] StorageError),
    /// Capture points could not be registered.
    #[error("failure funnel registration failed: {0}")]
    Funnel(#[from] FunnelError),
    /// Lifecycle method called in the wrong phase.
    #[error("illegal host transition {from} -> {to}")]
    IllegalTransition {
        /// Phase at the time of the call.
        from: HostState,
        /// Requested phase.
        to: HostState,
    },
    /// Panic or other failure caught by a startup guard.
    #[error("unrecoverable startup failure: {0}")]
    Startup(FailureCause),
    /// Panic on the main thread while the host was running.
    #[error("unrecoverable failure while running: {0}")]
    Session(FailureCause),
}

impl HostError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            HostError::StorageUnavailable(_) => EXIT_STORAGE_UNAVAILABLE,
            _ => EXIT_FAILURE,
        }
    }
}
