#![warn(missing_docs)]
//! # labhost-auth
//!
//! ## Purpose
//! Implements account lockout tracking and the authentication gate used by
//! the login screen of `labhost`.
//!
//! ## Responsibilities
//! - Count failed attempts per account and enforce a temporary lockout
//!   ([`AccountLockoutTracker`]).
//! - Verify salted password hashes held in a [`CredentialStore`].
//! - Drive one login attempt through its phases and return a typed
//!   [`LoginOutcome`] ([`AuthenticationGate`]).
//! - Provide the privileged administrator paths: password reset to the
//!   configured default and explicit unlock.
//!
//! ## Data flow
//! Login UI submits identifier + secret -> [`AuthenticationGate::attempt_login`]
//! checks the lock, verifies the hash, updates the tracker in one per-account
//! critical section -> one audit entry -> outcome returned to the UI.
//!
//! ## Ownership and lifetimes
//! The gate shares the tracker and store through `Arc` so the host can hand
//! the same instances to other services. Secrets are borrowed for the
//! duration of a call and never stored.
//!
//! ## Error model
//! Login outcomes are values, not errors. Administrative operations return
//! [`AuthError`].
//!
//! ## Security and privacy notes
//! - Secrets and hashes are never written to the audit log.
//! - A locked account is rejected before any credential comparison. This is
//!   not hardened against timing analysis.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use labhost_auth::AccountLockoutTracker;
//! use labhost_core::{SecurityPolicy, SystemClock};
//!
//! let tracker = AccountLockoutTracker::new(&SecurityPolicy::default(), Arc::new(SystemClock));
//! assert!(!tracker.is_locked("tech1"));
//! assert_eq!(tracker.snapshot("tech1").failed_attempt_count, 0);
//! ```

mod credentials;
mod gate;
mod lockout;

use thiserror::Error;

pub use credentials::{
    Account, AccountRecord, AccountRole, CredentialStore, InMemoryCredentialStore, PasswordHash,
    validate_password,
};
pub use gate::{AuthenticationGate, FailureReason, LoginOutcome, LoginPhase, LoginReport};
pub use lockout::{AccountLock, AccountLockoutTracker, FailureRecord, LockoutState};

/// Errors produced by administrative and credential operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No account with this identifier exists.
    #[error("unknown account '{0}'")]
    UnknownAccount(String),
    /// Actor lacks the administrator role.
    #[error("account '{actor}' is not allowed to {action}")]
    NotAuthorized {
        /// Acting account.
        actor: String,
        /// Attempted operation.
        action: &'static str,
    },
    /// Current secret did not match.
    #[error("invalid credentials")]
    InvalidCredentials,
    /// Account is inside a lockout window.
    #[error("account '{0}' is locked")]
    Locked(String),
    /// Candidate password violates the security policy.
    #[error("password rejected: {0}")]
    WeakPassword(String),
    /// Credential store failure.
    #[error("credential store failure: {0}")]
    Store(String),
    /// Login attempt phase machine was driven out of order.
    #[error("illegal login transition {from:?} -> {to:?}")]
    IllegalTransition {
        /// Phase before the transition.
        from: LoginPhase,
        /// Requested phase.
        to: LoginPhase,
    },
}
