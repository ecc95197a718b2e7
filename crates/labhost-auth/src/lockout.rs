//! Per-account failed-attempt counters and lockout windows.
//!
//! Each account owns its own mutex, so attempts on one account serialize
//! while different accounts proceed in parallel. The account map lock is held
//! only long enough to find, insert or drop an entry.
//!
//! Entries back at the default state are dropped once no caller holds them,
//! and entries whose lockout has expired are pruned as the map grows, so
//! identifiers that never fail again do not accumulate. Lock order is always
//! map, then account.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use labhost_core::{Clock, SecurityPolicy};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// Lockout bookkeeping for one account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutState {
    /// Consecutive failures since the last success, reset or expired lockout.
    pub failed_attempt_count: u32,
    /// End of the current (or most recent) lockout window.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub locked_until: Option<OffsetDateTime>,
}

impl LockoutState {
    /// Returns `true` when a lockout is set and strictly in the future.
    pub fn is_locked_at(&self, now: OffsetDateTime) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }
}

/// Result of recording one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureRecord {
    /// Failure count after this attempt.
    pub failed_attempt_count: u32,
    /// Lockout expiry when this attempt reached the threshold.
    pub locked_until: Option<OffsetDateTime>,
}

/// Map size below which no pruning pass runs.
const PRUNE_FLOOR: usize = 256;

type AccountEntry = Arc<Mutex<LockoutState>>;

struct AccountMap {
    entries: HashMap<String, AccountEntry>,
    prune_at: usize,
}

/// Tracks failed attempts and lockout windows for every account.
pub struct AccountLockoutTracker {
    accounts: Mutex<AccountMap>,
    max_failed_attempts: u32,
    lockout_duration: Duration,
    clock: Arc<dyn Clock>,
}

impl AccountLockoutTracker {
    /// Creates a tracker using the policy's threshold and window.
    pub fn new(policy: &SecurityPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            accounts: Mutex::new(AccountMap {
                entries: HashMap::new(),
                prune_at: PRUNE_FLOOR,
            }),
            max_failed_attempts: policy.max_failed_attempts.max(1),
            lockout_duration: policy.lockout_duration(),
            clock,
        }
    }

    /// Records one failed attempt.
    pub fn record_failure(&self, account_id: &str) -> FailureRecord {
        self.with_account(account_id, |lock| lock.record_failure())
    }

    /// Clears the counter and any lockout. A no-op for unknown accounts.
    pub fn record_success(&self, account_id: &str) {
        if let Some(entry) = self.existing(account_id) {
            *lock_state(&entry) = LockoutState::default();
            self.release(account_id, entry);
        }
    }

    /// Explicit administrative reset; same effect as [`Self::record_success`].
    pub fn reset(&self, account_id: &str) {
        self.record_success(account_id);
    }

    /// Returns `true` while the account's lockout window is open.
    pub fn is_locked(&self, account_id: &str) -> bool {
        let now = self.clock.now();
        self.existing(account_id)
            .is_some_and(|entry| lock_state(&entry).is_locked_at(now))
    }

    /// Returns the lockout expiry while the window is open.
    pub fn locked_until(&self, account_id: &str) -> Option<OffsetDateTime> {
        let now = self.clock.now();
        self.existing(account_id).and_then(|entry| {
            let state = *lock_state(&entry);
            state.locked_until.filter(|_| state.is_locked_at(now))
        })
    }

    /// Returns a copy of the stored state (default for unknown accounts).
    pub fn snapshot(&self, account_id: &str) -> LockoutState {
        self.existing(account_id)
            .map(|entry| *lock_state(&entry))
            .unwrap_or_default()
    }

    /// Runs `f` while holding the account's lock.
    ///
    /// Checking the lock and recording the outcome inside one call closes the
    /// check-then-increment race between concurrent attempts.
    pub fn with_account<R>(&self, account_id: &str, f: impl FnOnce(&mut AccountLock<'_>) -> R) -> R {
        let entry = self.entry(account_id);
        let result = {
            let mut state = lock_state(&entry);
            let mut lock = AccountLock {
                state: &mut *state,
                now: self.clock.now(),
                max_failed_attempts: self.max_failed_attempts,
                lockout_duration: self.lockout_duration,
            };
            f(&mut lock)
        };
        self.release(account_id, entry);
        result
    }

    /// Number of accounts with stored state.
    pub fn tracked_accounts(&self) -> usize {
        self.map().entries.len()
    }

    /// Returns the configured failure threshold.
    pub fn max_failed_attempts(&self) -> u32 {
        self.max_failed_attempts
    }

    fn map(&self) -> MutexGuard<'_, AccountMap> {
        self.accounts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn existing(&self, account_id: &str) -> Option<AccountEntry> {
        self.map().entries.get(account_id).cloned()
    }

    fn entry(&self, account_id: &str) -> AccountEntry {
        let mut map = self.map();
        if let Some(entry) = map.entries.get(account_id) {
            return Arc::clone(entry);
        }

        if map.entries.len() >= map.prune_at {
            let now = self.clock.now();
            map.entries.retain(|_, entry| !is_idle(entry, now));
            map.prune_at = (map.entries.len() * 2).max(PRUNE_FLOOR);
        }
        let entry = AccountEntry::default();
        map.entries.insert(account_id.to_string(), Arc::clone(&entry));
        entry
    }

    /// Drops the caller's handle and removes the entry when it is back at
    /// the default state and nobody else holds it.
    fn release(&self, account_id: &str, entry: AccountEntry) {
        let mut map = self.map();
        drop(entry);
        let removable = map.entries.get(account_id).is_some_and(|stored| {
            Arc::strong_count(stored) == 1 && *lock_state(stored) == LockoutState::default()
        });
        if removable {
            map.entries.remove(account_id);
        }
    }
}

/// Unheld entry whose state carries nothing forward: default, or a lockout
/// that has expired (the next failure restarts the count anyway).
fn is_idle(entry: &AccountEntry, now: OffsetDateTime) -> bool {
    if Arc::strong_count(entry) != 1 {
        return false;
    }
    let state = *lock_state(entry);
    state == LockoutState::default() || state.locked_until.is_some_and(|until| until <= now)
}

fn lock_state(entry: &Mutex<LockoutState>) -> MutexGuard<'_, LockoutState> {
    entry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Exclusive view of one account's state, valid inside
/// [`AccountLockoutTracker::with_account`].
pub struct AccountLock<'a> {
    state: &'a mut LockoutState,
    now: OffsetDateTime,
    max_failed_attempts: u32,
    lockout_duration: Duration,
}

impl AccountLock<'_> {
    /// Returns `true` while the lockout window is open.
    pub fn is_locked(&self) -> bool {
        self.state.is_locked_at(self.now)
    }

    /// Returns the lockout expiry while the window is open.
    pub fn locked_until(&self) -> Option<OffsetDateTime> {
        self.state.locked_until.filter(|_| self.is_locked())
    }

    /// Returns the current failure count.
    pub fn failed_attempt_count(&self) -> u32 {
        self.state.failed_attempt_count
    }

    /// Counts one failure, opening a lockout window at the threshold.
    ///
    /// A lockout that has already expired restarts the count.
    pub fn record_failure(&mut self) -> FailureRecord {
        if self
            .state
            .locked_until
            .is_some_and(|until| until <= self.now)
        {
            *self.state = LockoutState::default();
        }

        self.state.failed_attempt_count = self.state.failed_attempt_count.saturating_add(1);
        let mut newly_locked = None;
        if self.state.failed_attempt_count >= self.max_failed_attempts {
            let until = self.now + self.lockout_duration;
            self.state.locked_until = Some(until);
            newly_locked = Some(until);
        }

        FailureRecord {
            failed_attempt_count: self.state.failed_attempt_count,
            locked_until: newly_locked,
        }
    }

    /// Clears the counter and any lockout.
    pub fn record_success(&mut self) {
        *self.state = LockoutState::default();
    }
}

#[cfg(test)]
mod tests {
    use labhost_core::ManualClock;
    use time::macros::datetime;

    use super::*;

    fn tracker(clock: Arc<ManualClock>) -> AccountLockoutTracker {
        AccountLockoutTracker::new(&SecurityPolicy::default(), clock)
    }

    #[test]
    fn locks_at_threshold_and_unlocks_after_window() {
        let clock = Arc::new(ManualClock::new(datetime!(2026-01-10 08:00 UTC)));
        let tracker = tracker(clock.clone());

        for attempt in 1..=4 {
            let record = tracker.record_failure("tech1");
            assert_eq!(record.failed_attempt_count, attempt);
            assert_eq!(record.locked_until, None);
            assert!(!tracker.is_locked("tech1"));
        }

        let record = tracker.record_failure("tech1");
        assert_eq!(record.locked_until, Some(datetime!(2026-01-10 08:30 UTC)));
        assert!(tracker.is_locked("tech1"));

        clock.advance(Duration::minutes(30));
        assert!(!tracker.is_locked("tech1"), "expiry instant is not locked");
        assert_eq!(tracker.snapshot("tech1").failed_attempt_count, 5);
    }

    #[test]
    fn failure_after_expired_lockout_restarts_count() {
        let clock = Arc::new(ManualClock::new(datetime!(2026-01-10 08:00 UTC)));
        let tracker = tracker(clock.clone());
        for _ in 0..5 {
            tracker.record_failure("tech1");
        }

        clock.advance(Duration::minutes(31));
        let record = tracker.record_failure("tech1");
        assert_eq!(record.failed_attempt_count, 1);
        assert!(!tracker.is_locked("tech1"));
    }

    #[test]
    fn success_clears_count_and_lock() {
        let clock = Arc::new(ManualClock::new(datetime!(2026-01-10 08:00 UTC)));
        let tracker = tracker(clock);
        for _ in 0..5 {
            tracker.record_failure("tech1");
        }
        assert!(tracker.is_locked("tech1"));

        tracker.record_success("tech1");
        assert!(!tracker.is_locked("tech1"));
        assert_eq!(tracker.snapshot("tech1"), LockoutState::default());
    }

    #[test]
    fn success_on_unknown_account_is_a_no_op() {
        let clock = Arc::new(ManualClock::new(datetime!(2026-01-10 08:00 UTC)));
        let tracker = tracker(clock);
        tracker.record_success("nobody");
        assert_eq!(tracker.snapshot("nobody").failed_attempt_count, 0);
        assert!(!tracker.is_locked("nobody"));
        assert_eq!(tracker.locked_until("nobody"), None);
    }

    #[test]
    fn settled_accounts_leave_the_map() {
        let clock = Arc::new(ManualClock::new(datetime!(2026-01-10 08:00 UTC)));
        let tracker = tracker(clock);

        tracker.record_failure("tech1");
        tracker.record_failure("tech2");
        assert_eq!(tracker.tracked_accounts(), 2);

        tracker.record_success("tech1");
        assert_eq!(tracker.tracked_accounts(), 1);
        tracker.reset("tech2");
        assert_eq!(tracker.tracked_accounts(), 0);

        let locked = tracker.with_account("rand-1", |lock| lock.is_locked());
        assert!(!locked);
        assert_eq!(tracker.tracked_accounts(), 0, "a bare lock check stores nothing");
    }

    #[test]
    fn expired_lockouts_are_pruned_as_the_map_grows() {
        let clock = Arc::new(ManualClock::new(datetime!(2026-01-10 08:00 UTC)));
        let tracker = tracker(clock.clone());
        for index in 0..PRUNE_FLOOR {
            let id = format!("user-{index}");
            for _ in 0..5 {
                tracker.record_failure(&id);
            }
        }
        assert_eq!(tracker.tracked_accounts(), PRUNE_FLOOR);

        clock.advance(Duration::minutes(31));
        tracker.record_failure("tech1");
        assert_eq!(tracker.tracked_accounts(), 1);
        assert_eq!(tracker.snapshot("tech1").failed_attempt_count, 1);
    }

    #[test]
    fn accounts_are_tracked_independently() {
        let clock = Arc::new(ManualClock::new(datetime!(2026-01-10 08:00 UTC)));
        let tracker = tracker(clock);
        for _ in 0..5 {
            tracker.record_failure("tech1");
        }
        tracker.record_failure("tech2");

        assert!(tracker.is_locked("tech1"));
        assert!(!tracker.is_locked("tech2"));
        assert_eq!(tracker.snapshot("tech2").failed_attempt_count, 1);
    }
}
