//! Shared fixtures for auth integration tests.

use std::sync::Arc;

use labhost_auth::{
    Account, AccountLockoutTracker, AccountRole, AuthenticationGate, InMemoryCredentialStore,
};
use labhost_core::{ManualClock, SecurityPolicy};
use labhost_logging::{AuditLog, MemoryLogSink};
use time::macros::datetime;

/// Gate plus handles on its collaborators.
#[allow(dead_code)]
pub struct Fixture {
    pub gate: AuthenticationGate,
    pub tracker: Arc<AccountLockoutTracker>,
    pub store: Arc<InMemoryCredentialStore>,
    pub sink: Arc<MemoryLogSink>,
    pub clock: Arc<ManualClock>,
    pub policy: Arc<SecurityPolicy>,
}

/// Builds a gate with `admin` (Administrator) and `tech1` (Technician).
#[allow(dead_code)]
pub fn fixture() -> Fixture {
    fixture_with_policy(SecurityPolicy::default())
}

/// Same as [`fixture`] with a custom policy.
#[allow(dead_code)]
pub fn fixture_with_policy(policy: SecurityPolicy) -> Fixture {
    let policy = Arc::new(policy);
    let clock = Arc::new(ManualClock::new(datetime!(2026-01-12 07:45 UTC)));
    let sink = Arc::new(MemoryLogSink::new());
    let store = Arc::new(InMemoryCredentialStore::new());
    store.insert(
        Account {
            id: "admin".to_string(),
            display_name: "Lab Administrator".to_string(),
            role: AccountRole::Administrator,
        },
        "Admin#2026",
    );
    store.insert(
        Account {
            id: "tech1".to_string(),
            display_name: "Bench Technician".to_string(),
            role: AccountRole::Technician,
        },
        "Pipette9!",
    );

    let tracker = Arc::new(AccountLockoutTracker::new(&policy, clock.clone()));
    let gate = AuthenticationGate::new(
        store.clone(),
        tracker.clone(),
        AuditLog::new(sink.clone(), clock.clone()),
        policy.clone(),
    );

    Fixture {
        gate,
        tracker,
        store,
        sink,
        clock,
        policy,
    }
}
