//! Authentication gate: one login attempt from submission to outcome.
//!
//! ```text
//! Idle -> Checking -> Locked
//!                  -> Authenticating -> Succeeded
//!                                    -> Failed
//! Idle -> Failed                        (empty identifier)
//! ```
//!
//! Every attempt performs at most one tracker mutation and exactly one audit
//! log write.

use std::sync::Arc;

use labhost_core::{CATEGORY_APPLICATION, LogLevel, SecurityPolicy};
use labhost_logging::AuditLog;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::{
    Account, AccountLockoutTracker, AuthError, CredentialStore, PasswordHash, validate_password,
};

/// Phase of one login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginPhase {
    /// Nothing submitted yet.
    Idle,
    /// Lock state being consulted.
    Checking,
    /// Rejected because the account is locked.
    Locked,
    /// Credentials being compared.
    Authenticating,
    /// Credentials accepted.
    Succeeded,
    /// Credentials rejected.
    Failed,
}

impl LoginPhase {
    fn can_advance_to(self, next: LoginPhase) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Checking)
                | (Self::Idle, Self::Failed)
                | (Self::Checking, Self::Locked)
                | (Self::Checking, Self::Authenticating)
                | (Self::Authenticating, Self::Succeeded)
                | (Self::Authenticating, Self::Failed)
        )
    }
}

/// Why a login failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Identifier was blank.
    EmptyIdentifier,
    /// Unknown account or wrong secret.
    InvalidCredentials {
        /// Failure count after this attempt.
        failed_attempts: u32,
        /// Set when this attempt triggered a lockout.
        locked_until: Option<OffsetDateTime>,
    },
}

/// Typed result rendered by the login screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Session may start for this account.
    Succeeded(Account),
    /// Attempt rejected.
    Failed(FailureReason),
    /// Account is inside a lockout window.
    Locked {
        /// Window end.
        until: OffsetDateTime,
    },
}

/// Outcome plus the phases the attempt went through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginReport {
    /// Final outcome.
    pub outcome: LoginOutcome,
    /// Visited phases, starting with [`LoginPhase::Idle`].
    pub phases: Vec<LoginPhase>,
}

#[derive(Debug)]
struct AttemptMachine {
    phases: Vec<LoginPhase>,
}

impl AttemptMachine {
    fn new() -> Self {
        Self {
            phases: vec![LoginPhase::Idle],
        }
    }

    fn current(&self) -> LoginPhase {
        self.phases.last().copied().unwrap_or(LoginPhase::Idle)
    }

    fn advance(&mut self, next: LoginPhase) -> Result<(), AuthError> {
        let from = self.current();
        if !from.can_advance_to(next) {
            return Err(AuthError::IllegalTransition { from, to: next });
        }
        self.phases.push(next);
        Ok(())
    }
}

/// Validates credentials against the store under lockout control.
pub struct AuthenticationGate {
    store: Arc<dyn CredentialStore>,
    tracker: Arc<AccountLockoutTracker>,
    audit: AuditLog,
    policy: Arc<SecurityPolicy>,
}

impl AuthenticationGate {
    /// Creates a gate over shared collaborators.
    pub fn new(
        store: Arc<dyn CredentialStore>,
        tracker: Arc<AccountLockoutTracker>,
        audit: AuditLog,
        policy: Arc<SecurityPolicy>,
    ) -> Self {
        Self {
            store,
            tracker,
            audit,
            policy,
        }
    }

    /// Returns the shared lockout tracker.
    pub fn tracker(&self) -> &Arc<AccountLockoutTracker> {
        &self.tracker
    }

    /// Attempts a login and returns the typed outcome.
    pub fn attempt_login(&self, identifier: &str, secret: &str) -> LoginOutcome {
        self.attempt_login_detailed(identifier, secret).outcome
    }

    /// Attempts a login and also returns the visited phases.
    pub fn attempt_login_detailed(&self, identifier: &str, secret: &str) -> LoginReport {
        let mut machine = AttemptMachine::new();
        let account_id = identifier.trim();

        if account_id.is_empty() {
            transition(&mut machine, LoginPhase::Failed);
            let outcome = LoginOutcome::Failed(FailureReason::EmptyIdentifier);
            self.audit_outcome(account_id, &outcome);
            return LoginReport {
                outcome,
                phases: machine.phases,
            };
        }

        transition(&mut machine, LoginPhase::Checking);
        let outcome = self.tracker.with_account(account_id, |lock| {
            if let Some(until) = lock.locked_until() {
                transition(&mut machine, LoginPhase::Locked);
                return LoginOutcome::Locked { until };
            }

            transition(&mut machine, LoginPhase::Authenticating);
            let verified = self
                .store
                .find(account_id)
                .filter(|record| record.password.verify(secret));

            match verified {
                Some(record) => {
                    lock.record_success();
                    transition(&mut machine, LoginPhase::Succeeded);
                    LoginOutcome::Succeeded(record.account)
                }
                None => {
                    let record = lock.record_failure();
                    transition(&mut machine, LoginPhase::Failed);
                    LoginOutcome::Failed(FailureReason::InvalidCredentials {
                        failed_attempts: record.failed_attempt_count,
                        locked_until: record.locked_until,
                    })
                }
            }
        });

        self.audit_outcome(account_id, &outcome);
        LoginReport {
            outcome,
            phases: machine.phases,
        }
    }

    /// Resets `account_id`'s password to the configured default.
    ///
    /// This is a privileged bypass: it does not consult or modify lockout
    /// state, and it is always audited with the administrator's identity.
    ///
    /// # Errors
    /// Returns [`AuthError::NotAuthorized`] unless `administrator_id` is an
    /// administrator, and [`AuthError::UnknownAccount`] for a missing target.
    pub fn reset_password(&self, administrator_id: &str, account_id: &str) -> Result<(), AuthError> {
        self.require_administrator(administrator_id, "reset passwords")?;
        let target = account_id.trim();
        self.store
            .update_password(target, PasswordHash::derive(&self.policy.default_reset_password))?;

        self.audit.log_info(
            format!("password for '{target}' reset to default by administrator '{administrator_id}'"),
            CATEGORY_APPLICATION,
        );
        Ok(())
    }

    /// Clears lockout state for `account_id` on behalf of an administrator.
    ///
    /// # Errors
    /// Returns [`AuthError::NotAuthorized`] unless `administrator_id` is an
    /// administrator, and [`AuthError::UnknownAccount`] for a missing target.
    pub fn unlock_account(&self, administrator_id: &str, account_id: &str) -> Result<(), AuthError> {
        self.require_administrator(administrator_id, "unlock accounts")?;
        let target = account_id.trim();
        if self.store.find(target).is_none() {
            return Err(AuthError::UnknownAccount(target.to_string()));
        }

        self.tracker.reset(target);
        self.audit.log_info(
            format!("account '{target}' unlocked by administrator '{administrator_id}'"),
            CATEGORY_APPLICATION,
        );
        Ok(())
    }

    /// Replaces an account's password after verifying the current one.
    ///
    /// The current secret is checked under the same lockout rules as a
    /// login: a locked account is rejected without comparison, and a wrong
    /// secret counts as a failed attempt and is audited.
    ///
    /// # Errors
    /// Returns [`AuthError::Locked`] inside a lockout window,
    /// [`AuthError::InvalidCredentials`] when `current_secret` is wrong, and
    /// [`AuthError::WeakPassword`] when `new_secret` violates the policy.
    pub fn change_password(
        &self,
        account_id: &str,
        current_secret: &str,
        new_secret: &str,
    ) -> Result<(), AuthError> {
        let account_id = account_id.trim();
        if account_id.is_empty() {
            self.audit_rejection(
                "password change",
                account_id,
                &LoginOutcome::Failed(FailureReason::EmptyIdentifier),
            );
            return Err(AuthError::InvalidCredentials);
        }
        let verified = self.tracker.with_account(account_id, |lock| {
            if let Some(until) = lock.locked_until() {
                return Err(LoginOutcome::Locked { until });
            }
            match self
                .store
                .find(account_id)
                .filter(|record| record.password.verify(current_secret))
            {
                Some(record) => {
                    lock.record_success();
                    Ok(record)
                }
                None => {
                    let record = lock.record_failure();
                    Err(LoginOutcome::Failed(FailureReason::InvalidCredentials {
                        failed_attempts: record.failed_attempt_count,
                        locked_until: record.locked_until,
                    }))
                }
            }
        });

        let record = match verified {
            Ok(record) => record,
            Err(rejection) => {
                self.audit_rejection("password change", account_id, &rejection);
                return Err(match rejection {
                    LoginOutcome::Locked { .. } => AuthError::Locked(account_id.to_string()),
                    _ => AuthError::InvalidCredentials,
                });
            }
        };
        validate_password(&self.policy, new_secret)?;

        self.store
            .update_password(&record.account.id, PasswordHash::derive(new_secret))?;
        self.audit.log_info(
            format!("password changed for '{account_id}'"),
            CATEGORY_APPLICATION,
        );
        Ok(())
    }

    fn require_administrator(&self, administrator_id: &str, action: &'static str) -> Result<(), AuthError> {
        let is_admin = self
            .store
            .find(administrator_id.trim())
            .is_some_and(|record| record.account.is_administrator());
        if is_admin {
            return Ok(());
        }

        self.audit.log_warning(
            format!("'{administrator_id}' denied: not allowed to {action}"),
            CATEGORY_APPLICATION,
        );
        Err(AuthError::NotAuthorized {
            actor: administrator_id.to_string(),
            action,
        })
    }

    fn audit_outcome(&self, account_id: &str, outcome: &LoginOutcome) {
        match outcome {
            LoginOutcome::Succeeded(account) => self.audit.log_info(
                format!("user '{}' logged in", account.id),
                CATEGORY_APPLICATION,
            ),
            rejection => self.audit_rejection("login", account_id, rejection),
        }
    }

    fn audit_rejection(&self, action: &str, account_id: &str, rejection: &LoginOutcome) {
        let (level, message) = match rejection {
            LoginOutcome::Succeeded(_) => return,
            LoginOutcome::Locked { until } => (
                LogLevel::Warning,
                format!(
                    "account locked: {action} for '{account_id}' rejected until {}",
                    format_instant(*until)
                ),
            ),
            LoginOutcome::Failed(FailureReason::InvalidCredentials {
                failed_attempts,
                locked_until: Some(until),
            }) => (
                LogLevel::Error,
                format!(
                    "{action} failed for '{account_id}' (failed attempts: {failed_attempts}); account locked until {}",
                    format_instant(*until)
                ),
            ),
            LoginOutcome::Failed(FailureReason::InvalidCredentials {
                failed_attempts,
                locked_until: None,
            }) => (
                LogLevel::Warning,
                format!("{action} failed for '{account_id}' (failed attempts: {failed_attempts})"),
            ),
            LoginOutcome::Failed(FailureReason::EmptyIdentifier) => (
                LogLevel::Warning,
                format!("{action} rejected: empty account identifier"),
            ),
        };
        self.audit.record(level, message, None, CATEGORY_APPLICATION);
    }
}

fn transition(machine: &mut AttemptMachine, next: LoginPhase) {
    let advanced = machine.advance(next);
    debug_assert!(advanced.is_ok(), "illegal login transition to {next:?}");
}

fn format_instant(instant: OffsetDateTime) -> String {
    instant
        .format(&Rfc3339)
        .unwrap_or_else(|_| instant.to_string())
}
