//! Shared fixtures for funnel integration tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use labhost_core::ManualClock;
use labhost_funnel::ExceptionFunnel;
use labhost_logging::{MemoryErrorReporter, MemoryLogSink, MemoryNotifier};
use time::macros::datetime;

#[allow(dead_code)]
pub struct Harness {
    pub funnel: Arc<ExceptionFunnel>,
    pub sink: Arc<MemoryLogSink>,
    pub reporter: Arc<MemoryErrorReporter>,
    pub notifier: Arc<MemoryNotifier>,
}

#[allow(dead_code)]
pub fn harness() -> Harness {
    let sink = Arc::new(MemoryLogSink::new());
    let reporter = Arc::new(MemoryErrorReporter::new());
    let notifier = Arc::new(MemoryNotifier::new());
    let funnel = Arc::new(ExceptionFunnel::new(
        sink.clone(),
        reporter.clone(),
        notifier.clone(),
        Arc::new(ManualClock::new(datetime!(2026-03-02 14:30 UTC))),
    ));
    Harness {
        funnel,
        sink,
        reporter,
        notifier,
    }
}

#[allow(dead_code)]
/// Polls until the sink holds `expected` entries or two seconds pass.
pub fn wait_for_entries(sink: &MemoryLogSink, expected: usize) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if sink.len() >= expected {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    sink.len() >= expected
}
