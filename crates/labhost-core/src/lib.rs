#![warn(missing_docs)]
//! # labhost-core
//!
//! ## Purpose
//! Defines the pure data model shared by every `labhost` crate.
//!
//! ## Responsibilities
//! - Represent structured log records ([`LogEntry`]) and their severity.
//! - Describe captured failures ([`FailureCause`], [`FailureEvent`]) and the
//!   execution context that produced them ([`FailureSource`]).
//! - Load the process-wide [`SecurityPolicy`] from configuration, environment
//!   and built-in constants.
//! - Abstract wall-clock time behind [`Clock`] so lockout windows are testable.
//!
//! ## Data flow
//! Failure capture points build a [`FailureEvent`]; the funnel turns it into a
//! [`LogEntry`] for the logging sink. The auth crate reads the
//! [`SecurityPolicy`] and a [`Clock`] to drive lockout windows.
//!
//! ## Ownership and lifetimes
//! Entries and causes own their strings so they can cross thread boundaries
//! (background writers, panic relay) without borrowing from the failing code.
//!
//! ## Error model
//! Configuration and codec failures are reported as [`CoreError`].
//!
//! ## Security and privacy notes
//! Nothing in this crate stores credentials. The default reset password is
//! held in [`SecurityPolicy`] and is never written into a [`LogEntry`].
//!
//! ## Example
//! ```rust
//! use labhost_core::{LogEntry, LogLevel};
//! use time::macros::datetime;
//!
//! let entry = LogEntry::new(datetime!(2026-01-05 08:00 UTC), LogLevel::Info, "Application", "started");
//! assert_eq!(entry.level, LogLevel::Info);
//! assert!(entry.cause.is_none());
//! ```

pub mod clock;
pub mod policy;

use std::any::Any;
use std::fmt;
use std::panic::Location;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

pub use clock::{Clock, ManualClock, SystemClock};
pub use policy::{
    AppSettings, HostSettings, LoggingSettings, SecurityPolicy, SecuritySettings, StorageSettings,
};

/// Category used for application-level audit entries.
pub const CATEGORY_APPLICATION: &str = "Application";

/// Category used for entries produced by the failure funnel.
pub const CATEGORY_FAILURE: &str = "UnhandledFailure";

/// Severity of one [`LogEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LogLevel {
    /// Normal operational record.
    Info,
    /// Recoverable or security-relevant condition.
    Warning,
    /// Failure that reached a handler.
    Error,
}

impl LogLevel {
    /// Returns the upper-case label used in plain-text renderings.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured description of an error or panic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureCause {
    /// Short classification, e.g. the error type or `panic`.
    pub kind: String,
    /// Top-level human-readable message.
    pub message: String,
    /// Messages of nested `source()` errors, outermost first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chain: Vec<String>,
    /// Source location (`file:line:column`) when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl FailureCause {
    /// Creates a cause from a kind label and message.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            chain: Vec::new(),
            location: None,
        }
    }

    /// Builds a cause from any error value, walking its `source()` chain.
    pub fn from_error<E>(error: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        let mut chain = Vec::new();
        let mut next = error.source();
        while let Some(source) = next {
            chain.push(source.to_string());
            next = source.source();
        }

        Self {
            kind: short_type_name::<E>().to_string(),
            message: error.to_string(),
            chain,
            location: None,
        }
    }

    /// Builds a cause from a panic payload as returned by `catch_unwind`.
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(text) = payload.downcast_ref::<&'static str>() {
            (*text).to_string()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "panic with non-string payload".to_string()
        };

        Self::new("panic", message)
    }

    /// Attaches a source location.
    pub fn with_location(mut self, location: &Location<'_>) -> Self {
        self.location = Some(format!(
            "{}:{}:{}",
            location.file(),
            location.line(),
            location.column()
        ));
        self
    }

    /// Renders the cause on one line, including nested sources.
    pub fn summary(&self) -> String {
        let mut summary = format!("{}: {}", self.kind, self.message);
        for source in &self.chain {
            summary.push_str(" <- ");
            summary.push_str(source);
        }
        if let Some(location) = &self.location {
            summary.push_str(" at ");
            summary.push_str(location);
        }
        summary
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// One immutable structured log record.
///
/// Field order is stable in the serialized form: `timestamp`, `level`,
/// `category`, `message`, `cause`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Creation time (UTC).
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Severity.
    pub level: LogLevel,
    /// Free-form subsystem label, e.g. `Application`.
    pub category: String,
    /// Human-readable message.
    pub message: String,
    /// Optional structured cause.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<FailureCause>,
}

impl LogEntry {
    /// Creates an entry without a cause.
    pub fn new(
        timestamp: OffsetDateTime,
        level: LogLevel,
        category: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            level,
            category: category.into(),
            message: message.into(),
            cause: None,
        }
    }

    /// Attaches a structured cause.
    pub fn with_cause(mut self, cause: FailureCause) -> Self {
        self.cause = Some(cause);
        self
    }

    /// Serializes the entry as one compact JSON line (no trailing newline).
    ///
    /// # Errors
    /// Returns [`CoreError::Codec`] when JSON serialization fails.
    pub fn to_json_line(&self) -> Result<String, CoreError> {
        serde_json::to_string(self).map_err(CoreError::Codec)
    }

    /// Parses an entry from one JSON line.
    ///
    /// # Errors
    /// Returns [`CoreError::Codec`] when the line is not a valid entry.
    pub fn from_json_line(line: &str) -> Result<Self, CoreError> {
        serde_json::from_str(line.trim_end()).map_err(CoreError::Codec)
    }
}

/// Execution context a captured failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureSource {
    /// The cooperative UI event loop.
    UiThread,
    /// Any thread not covered by another capture point.
    ProcessDomain,
    /// Detached background work.
    BackgroundTask,
}

impl fmt::Display for FailureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::UiThread => "UIThread",
            Self::ProcessDomain => "ProcessDomain",
            Self::BackgroundTask => "BackgroundTask",
        };
        f.write_str(label)
    }
}

/// A failure observed by one capture point. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureEvent {
    /// Capturing context.
    pub source: FailureSource,
    /// What went wrong.
    pub cause: FailureCause,
    /// `true` when the process is already going down.
    pub terminating: bool,
    /// Capture time.
    pub observed_at: OffsetDateTime,
}

impl FailureEvent {
    /// Creates a non-terminating event.
    pub fn new(source: FailureSource, cause: FailureCause, observed_at: OffsetDateTime) -> Self {
        Self {
            source,
            cause,
            terminating: false,
            observed_at,
        }
    }

    /// Marks whether the process is terminating.
    pub fn terminating(mut self, terminating: bool) -> Self {
        self.terminating = terminating;
        self
    }

    /// Converts the event into the Error-level entry written by the funnel.
    pub fn to_log_entry(&self) -> LogEntry {
        let qualifier = if self.terminating { " (terminating)" } else { "" };
        LogEntry::new(
            self.observed_at,
            LogLevel::Error,
            CATEGORY_FAILURE,
            format!(
                "unhandled failure from {}{qualifier}: {}",
                self.source, self.cause.message
            ),
        )
        .with_cause(self.cause.clone())
    }
}

/// Error type for configuration loading and codec failures.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration file could not be read.
    #[error("unable to read configuration '{path}': {source}")]
    ConfigRead {
        /// Path that failed.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Configuration file is not valid JSON for [`AppSettings`].
    #[error("invalid configuration '{path}': {source}")]
    ConfigParse {
        /// Path that failed.
        path: String,
        /// Underlying decode error.
        source: serde_json::Error,
    },
    /// Resolved policy violates its own bounds.
    #[error("invalid security policy: {0}")]
    InvalidPolicy(String),
    /// JSON encoding/decoding error.
    #[error("log codec failure: {0}")]
    Codec(#[from] serde_json::Error),
}
