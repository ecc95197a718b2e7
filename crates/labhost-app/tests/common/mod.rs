//! Shared fixtures for app integration tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use labhost_app::{
    HostLifecycleController, HostParts, MonitorError, PerformanceMonitor, StorageError,
    StorageInitializer, StorageStatus,
};
use labhost_auth::{Account, AccountRole, InMemoryCredentialStore};
use labhost_core::{ManualClock, SecurityPolicy};
use labhost_logging::{MemoryErrorReporter, MemoryLogSink, MemoryNotifier};
use time::macros::datetime;

static HOST_SLOT: Mutex<()> = Mutex::new(());

/// Serializes tests that activate the process-wide capture points.
#[allow(dead_code)]
pub fn exclusive_host() -> MutexGuard<'static, ()> {
    HOST_SLOT.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Storage collaborator with a scripted result.
#[allow(dead_code)]
pub enum ScriptedStorage {
    Ready,
    Unavailable,
    Panics,
}

impl StorageInitializer for ScriptedStorage {
    fn initialize(&self) -> Result<StorageStatus, StorageError> {
        match self {
            ScriptedStorage::Ready => Ok(StorageStatus::Current),
            ScriptedStorage::Unavailable => Err(StorageError::Unavailable(
                "database server refused the connection".to_string(),
            )),
            ScriptedStorage::Panics => panic!("storage driver crashed"),
        }
    }
}

/// Monitor that records calls and can be scripted to misbehave.
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingMonitor {
    pub calls: Mutex<Vec<&'static str>>,
    pub fail_stop: AtomicBool,
    pub hang_dispose: AtomicBool,
}

impl RecordingMonitor {
    fn record(&self, call: &'static str) {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(call);
    }

    #[allow(dead_code)]
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl PerformanceMonitor for RecordingMonitor {
    fn start(&self) -> Result<(), MonitorError> {
        self.record("start");
        Ok(())
    }

    fn stop(&self) -> Result<(), MonitorError> {
        self.record("stop");
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(MonitorError::WorkerPanicked);
        }
        Ok(())
    }

    fn cleanup(&self) -> Result<(), MonitorError> {
        self.record("cleanup");
        Ok(())
    }

    fn dispose(&self) -> Result<(), MonitorError> {
        self.record("dispose");
        if self.hang_dispose.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_secs(2));
        }
        Ok(())
    }
}

/// Host plus handles on every recording collaborator.
#[allow(dead_code)]
pub struct HostFixture {
    pub host: HostLifecycleController,
    pub sink: Arc<MemoryLogSink>,
    pub reporter: Arc<MemoryErrorReporter>,
    pub notifier: Arc<MemoryNotifier>,
    pub monitor: Arc<RecordingMonitor>,
    pub clock: Arc<ManualClock>,
}

/// Builds an unstarted host with `tech1` and `admin` accounts.
#[allow(dead_code)]
pub fn host_fixture(storage: ScriptedStorage) -> HostFixture {
    let sink = Arc::new(MemoryLogSink::new());
    let reporter = Arc::new(MemoryErrorReporter::new());
    let notifier = Arc::new(MemoryNotifier::new());
    let monitor = Arc::new(RecordingMonitor::default());
    let clock = Arc::new(ManualClock::new(datetime!(2026-01-12 07:45 UTC)));

    let store = Arc::new(InMemoryCredentialStore::new());
    store.insert(
        Account {
            id: "admin".to_string(),
            display_name: "Lab Admin".to_string(),
            role: AccountRole::Administrator,
        },
        "Admin#2026",
    );
    store.insert(
        Account {
            id: "tech1".to_string(),
            display_name: "Bench Tech".to_string(),
            role: AccountRole::Technician,
        },
        "Pipette9!",
    );

    let parts = HostParts {
        sink: sink.clone(),
        reporter: reporter.clone(),
        notifier: notifier.clone(),
        clock: clock.clone(),
        store,
    };
    let host = HostLifecycleController::new(
        parts,
        SecurityPolicy::default(),
        Arc::new(storage),
        monitor.clone(),
    )
    .with_step_timeout(Duration::from_millis(300));

    HostFixture {
        host,
        sink,
        reporter,
        notifier,
        monitor,
        clock,
    }
}
