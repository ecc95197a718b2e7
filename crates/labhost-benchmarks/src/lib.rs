#![warn(missing_docs)]
//! # labhost-benchmarks
//!
//! Shared setup for the smoke benchmarks in `tests/`.

use std::sync::Arc;

use labhost_auth::AccountLockoutTracker;
use labhost_core::{ManualClock, SecurityPolicy};
use labhost_funnel::ExceptionFunnel;
use labhost_logging::{MemoryErrorReporter, MemoryLogSink, MemoryNotifier};
use time::macros::datetime;

/// Tracker with the default policy and a frozen clock.
pub fn bench_tracker() -> AccountLockoutTracker {
    AccountLockoutTracker::new(
        &SecurityPolicy::default(),
        Arc::new(ManualClock::new(datetime!(2026-01-12 07:45 UTC))),
    )
}

/// Funnel over in-memory collaborators, plus its sink.
pub fn bench_funnel() -> (Arc<ExceptionFunnel>, Arc<MemoryLogSink>) {
    let sink = Arc::new(MemoryLogSink::new());
    let funnel = Arc::new(ExceptionFunnel::new(
        sink.clone(),
        Arc::new(MemoryErrorReporter::new()),
        Arc::new(MemoryNotifier::new()),
        Arc::new(ManualClock::new(datetime!(2026-01-12 07:45 UTC))),
    ));
    (funnel, sink)
}
