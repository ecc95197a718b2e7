#![warn(missing_docs)]
//! # labhost-funnel
//!
//! ## Purpose
//! Routes every unhandled failure in the host, from any of its three capture
//! points, into one log-then-report path.
//!
//! ## Responsibilities
//! - Capture UI event-loop failures and mark them handled
//!   ([`UiDispatcher`]).
//! - Capture process-wide panics through the panic hook, including those on
//!   the main thread that end the process ([`FunnelRegistration`]).
//! - Capture failures of detached background work ([`BackgroundSpawner`]).
//! - Log each failure once at Error level, then show a user-facing message,
//!   falling back to a blocking notice when logging or display fails
//!   ([`ExceptionFunnel`]).
//!
//! ## Data flow
//! capture point -> [`FailureHandler`] -> [`ExceptionFunnel::forward`] ->
//! log sink (always first) -> error reporter (unless the process is
//! terminating) -> [`Disposition`].
//!
//! ## Ownership and lifetimes
//! The funnel and its collaborators are shared through `Arc`. A single
//! [`FunnelRegistration`] may be active per process; dropping it restores
//! the previous panic hook.
//!
//! ## Error model
//! Forwarding never fails and never panics outward. Registration returns
//! [`FunnelError`].
//!
//! ## Security and privacy notes
//! Failure messages are logged verbatim. Callers must not put secrets into
//! panic payloads or error messages.
//!
//! ## Example
//! ```rust
//! use labhost_funnel::contain;
//!
//! let cause = contain(|| -> u8 { panic!("sample rack jammed") }).unwrap_err();
//! assert_eq!(cause.message, "sample rack jammed");
//! ```

mod capture;
mod funnel;
mod scope;

use thiserror::Error;

pub use capture::{BackgroundSpawner, FunnelRegistration, TERMINATION_LOG_BUDGET, UiDispatcher};
pub use funnel::{
    Disposition, ExceptionFunnel, FALLBACK_TITLE, FailureHandler, FunnelStats, user_message,
};
pub use scope::contain;

/// Errors produced when wiring the capture points.
#[derive(Debug, Error)]
pub enum FunnelError {
    /// Another registration already owns the process-wide panic hook.
    #[error("failure funnel is already installed")]
    AlreadyInstalled,
    /// A worker thread could not be started.
    #[error("failed to spawn funnel thread: {0}")]
    Spawn(#[source] std::io::Error),
}
