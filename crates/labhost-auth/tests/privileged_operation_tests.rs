//! Integration tests for administrator-only credential operations.

mod common;

use labhost_auth::{AuthError, LoginOutcome};
use labhost_core::LogLevel;

#[test]
fn privileged_operation_tests_reset_uses_default_password_and_is_audited() {
    let fx = common::fixture();
    for _ in 0..2 {
        fx.gate.attempt_login("tech1", "wrong");
    }
    let before = fx.tracker.snapshot("tech1");

    fx.gate
        .reset_password("admin", "tech1")
        .expect("administrator may reset");

    assert_eq!(fx.tracker.snapshot("tech1"), before, "lockout state untouched");
    let last = fx.sink.entries().pop().expect("reset must be logged");
    assert_eq!(last.level, LogLevel::Info);
    assert!(last.message.contains("'tech1'"));
    assert!(last.message.contains("administrator 'admin'"));
    assert!(!last.message.contains(&fx.policy.default_reset_password));

    assert!(matches!(
        fx.gate.attempt_login("tech1", &fx.policy.default_reset_password),
        LoginOutcome::Succeeded(_)
    ));
}

#[test]
fn privileged_operation_tests_non_administrators_are_refused() {
    let fx = common::fixture();
    let error = fx
        .gate
        .reset_password("tech1", "admin")
        .expect_err("technicians cannot reset");
    assert!(matches!(error, AuthError::NotAuthorized { .. }));
    assert_eq!(fx.sink.entries_at(LogLevel::Warning).len(), 1);

    assert!(matches!(
        fx.gate.attempt_login("admin", "Admin#2026"),
        LoginOutcome::Succeeded(_)
    ));
}

#[test]
fn privileged_operation_tests_unlock_clears_active_lockout() {
    let fx = common::fixture();
    for _ in 0..5 {
        fx.gate.attempt_login("tech1", "wrong");
    }
    assert!(fx.tracker.is_locked("tech1"));

    fx.gate
        .unlock_account("admin", "tech1")
        .expect("administrator may unlock");
    assert!(!fx.tracker.is_locked("tech1"));
    assert!(matches!(
        fx.gate.attempt_login("tech1", "Pipette9!"),
        LoginOutcome::Succeeded(_)
    ));
}

#[test]
fn privileged_operation_tests_change_password_enforces_policy() {
    let fx = common::fixture();
    let error = fx
        .gate
        .change_password("tech1", "Pipette9!", "abc")
        .expect_err("too short");
    assert!(matches!(error, AuthError::WeakPassword(_)));

    let error = fx
        .gate
        .change_password("tech1", "not-current", "Centrifuge1")
        .expect_err("wrong current secret");
    assert!(matches!(error, AuthError::InvalidCredentials));

    fx.gate
        .change_password("tech1", "Pipette9!", "Centrifuge1")
        .expect("valid change");
    assert!(matches!(
        fx.gate.attempt_login("tech1", "Centrifuge1"),
        LoginOutcome::Succeeded(_)
    ));
}

#[test]
fn privileged_operation_tests_wrong_current_secret_counts_toward_lockout() {
    let fx = common::fixture();
    for attempt in 1..=5u32 {
        let error = fx
            .gate
            .change_password("tech1", "guess", "Centrifuge1")
            .expect_err("wrong current secret");
        assert!(matches!(error, AuthError::InvalidCredentials));
        assert_eq!(fx.tracker.snapshot("tech1").failed_attempt_count, attempt);
    }
    assert!(fx.tracker.is_locked("tech1"));

    let warnings = fx.sink.entries_at(LogLevel::Warning);
    assert_eq!(warnings.len(), 4);
    assert!(warnings[3].message.contains("password change failed for 'tech1'"));
    assert!(warnings[3].message.contains("failed attempts: 4"));
    let errors = fx.sink.entries_at(LogLevel::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("failed attempts: 5"));
    assert!(errors[0].message.contains("locked until"));

    let error = fx
        .gate
        .change_password("tech1", "Pipette9!", "Centrifuge1")
        .expect_err("locked account");
    assert!(matches!(error, AuthError::Locked(ref id) if id == "tech1"));
    let last = fx.sink.entries().pop().expect("rejection is logged");
    assert!(last.message.starts_with("account locked: password change for 'tech1'"));
    assert!(matches!(
        fx.gate.attempt_login("tech1", "Pipette9!"),
        LoginOutcome::Locked { .. }
    ));
}
