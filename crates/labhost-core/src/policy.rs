//! Application settings and the process-wide security policy.
//!
//! Every policy field resolves in the same order: configuration key, then
//! environment variable, then the built-in constant. The resolved
//! [`SecurityPolicy`] is immutable for the lifetime of the process.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Environment variable naming the configuration file.
pub const ENV_CONFIG_PATH: &str = "LABHOST_CONFIG";
/// Configuration file looked up in the working directory by default.
pub const DEFAULT_CONFIG_FILE: &str = "labhost.json";

/// Environment override for the default reset password.
pub const ENV_DEFAULT_PASSWORD: &str = "LABHOST_DEFAULT_PASSWORD";
/// Environment override for the minimum password length.
pub const ENV_MIN_PASSWORD_LENGTH: &str = "LABHOST_MIN_PASSWORD_LENGTH";
/// Environment override for the failed-attempt threshold.
pub const ENV_MAX_FAILED_LOGIN_ATTEMPTS: &str = "LABHOST_MAX_FAILED_LOGIN_ATTEMPTS";
/// Environment override for the lockout window in minutes.
pub const ENV_LOCKOUT_DURATION_MINUTES: &str = "LABHOST_LOCKOUT_DURATION_MINUTES";
/// Environment override for the password complexity requirement.
pub const ENV_REQUIRE_COMPLEX_PASSWORD: &str = "LABHOST_REQUIRE_COMPLEX_PASSWORD";

/// Built-in minimum password length.
pub const FALLBACK_MIN_PASSWORD_LENGTH: usize = 4;
/// Built-in failed-attempt threshold.
pub const FALLBACK_MAX_FAILED_LOGIN_ATTEMPTS: u32 = 5;
/// Built-in lockout window in minutes.
pub const FALLBACK_LOCKOUT_DURATION_MINUTES: u32 = 30;
/// Built-in complexity requirement.
pub const FALLBACK_REQUIRE_COMPLEX_PASSWORD: bool = false;
/// Built-in default reset password.
pub const FALLBACK_DEFAULT_PASSWORD: &str = "Reset@1234";

/// Built-in per-step shutdown budget.
pub const DEFAULT_SHUTDOWN_STEP_TIMEOUT_MS: u64 = 5_000;

/// Raw application configuration as read from `labhost.json`.
///
/// All keys are optional; absent keys fall through to the environment and
/// then to the built-in constants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AppSettings {
    /// Password assigned by an administrator reset.
    pub default_password: Option<String>,
    /// Security policy overrides.
    pub security: SecuritySettings,
    /// Durable storage location.
    pub storage: StorageSettings,
    /// Log file location.
    pub logging: LoggingSettings,
    /// Host lifecycle tuning.
    pub host: HostSettings,
}

/// `Security` configuration section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SecuritySettings {
    /// Minimum accepted password length.
    pub min_password_length: Option<usize>,
    /// Consecutive failures that trigger a lockout.
    pub max_failed_login_attempts: Option<u32>,
    /// Lockout window length.
    pub account_lockout_duration_minutes: Option<u32>,
    /// Whether passwords need mixed character classes.
    pub require_complex_password: Option<bool>,
}

/// `Storage` configuration section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct StorageSettings {
    /// Directory holding the durable store.
    pub data_directory: Option<PathBuf>,
}

/// `Logging` configuration section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LoggingSettings {
    /// Directory receiving per-run log files.
    pub directory: Option<PathBuf>,
}

/// `Host` configuration section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct HostSettings {
    /// Upper bound for each shutdown step.
    pub shutdown_step_timeout_ms: Option<u64>,
}

impl AppSettings {
    /// Parses settings from a JSON document.
    ///
    /// # Errors
    /// Returns [`CoreError::ConfigParse`] when the document is malformed.
    pub fn from_json_str(raw: &str, origin: &str) -> Result<Self, CoreError> {
        serde_json::from_str(raw).map_err(|source| CoreError::ConfigParse {
            path: origin.to_string(),
            source,
        })
    }

    /// Loads settings from `path`. A missing file yields empty settings.
    ///
    /// # Errors
    /// Returns [`CoreError::ConfigRead`] for I/O failures other than
    /// not-found, and [`CoreError::ConfigParse`] for malformed JSON.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_json_str(&raw, &path.display().to_string()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(CoreError::ConfigRead {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    /// Loads settings from `LABHOST_CONFIG` or `./labhost.json`.
    ///
    /// # Errors
    /// See [`AppSettings::load`].
    pub fn load_default() -> Result<Self, CoreError> {
        let path = std::env::var_os(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load(&path)
    }

    /// Returns the configured shutdown step budget in milliseconds.
    pub fn shutdown_step_timeout_ms(&self) -> u64 {
        self.host
            .shutdown_step_timeout_ms
            .unwrap_or(DEFAULT_SHUTDOWN_STEP_TIMEOUT_MS)
    }
}

/// Process-wide security policy. Read-only after load.
#[derive(Clone, PartialEq, Eq)]
pub struct SecurityPolicy {
    /// Minimum accepted password length.
    pub min_password_length: usize,
    /// Consecutive failures that trigger a lockout.
    pub max_failed_attempts: u32,
    /// Lockout window length in minutes.
    pub lockout_duration_minutes: u32,
    /// Whether passwords need upper, lower, digit and symbol characters.
    pub require_complex_password: bool,
    /// Password assigned by an administrator reset.
    pub default_reset_password: String,
}

impl SecurityPolicy {
    /// Resolves the policy using the real process environment.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidPolicy`] when resolved values are out of
    /// bounds.
    pub fn from_settings(settings: &AppSettings) -> Result<Self, CoreError> {
        Self::resolve(settings, |key| std::env::var(key).ok())
    }

    /// Resolves the policy with an injectable environment lookup.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidPolicy`] when resolved values are out of
    /// bounds.
    pub fn resolve<F>(settings: &AppSettings, env: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let security = &settings.security;
        let policy = Self {
            min_password_length: security
                .min_password_length
                .or_else(|| parse_env(&env, ENV_MIN_PASSWORD_LENGTH))
                .unwrap_or(FALLBACK_MIN_PASSWORD_LENGTH),
            max_failed_attempts: security
                .max_failed_login_attempts
                .or_else(|| parse_env(&env, ENV_MAX_FAILED_LOGIN_ATTEMPTS))
                .unwrap_or(FALLBACK_MAX_FAILED_LOGIN_ATTEMPTS),
            lockout_duration_minutes: security
                .account_lockout_duration_minutes
                .or_else(|| parse_env(&env, ENV_LOCKOUT_DURATION_MINUTES))
                .unwrap_or(FALLBACK_LOCKOUT_DURATION_MINUTES),
            require_complex_password: security
                .require_complex_password
                .or_else(|| parse_env_bool(&env, ENV_REQUIRE_COMPLEX_PASSWORD))
                .unwrap_or(FALLBACK_REQUIRE_COMPLEX_PASSWORD),
            default_reset_password: settings
                .default_password
                .clone()
                .filter(|value| !value.is_empty())
                .or_else(|| env(ENV_DEFAULT_PASSWORD).filter(|value| !value.is_empty()))
                .unwrap_or_else(|| FALLBACK_DEFAULT_PASSWORD.to_string()),
        };

        policy.validate()?;
        Ok(policy)
    }

    /// Checks the policy's own bounds.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidPolicy`] describing the first violation.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_failed_attempts == 0 {
            return Err(CoreError::InvalidPolicy(
                "max failed login attempts must be at least 1".to_string(),
            ));
        }
        if self.min_password_length == 0 {
            return Err(CoreError::InvalidPolicy(
                "minimum password length must be at least 1".to_string(),
            ));
        }
        if self.lockout_duration_minutes == 0 {
            return Err(CoreError::InvalidPolicy(
                "lockout duration must be at least 1 minute".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the lockout window as a duration.
    pub fn lockout_duration(&self) -> time::Duration {
        time::Duration::minutes(i64::from(self.lockout_duration_minutes))
    }
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            min_password_length: FALLBACK_MIN_PASSWORD_LENGTH,
            max_failed_attempts: FALLBACK_MAX_FAILED_LOGIN_ATTEMPTS,
            lockout_duration_minutes: FALLBACK_LOCKOUT_DURATION_MINUTES,
            require_complex_password: FALLBACK_REQUIRE_COMPLEX_PASSWORD,
            default_reset_password: FALLBACK_DEFAULT_PASSWORD.to_string(),
        }
    }
}

impl fmt::Debug for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityPolicy")
            .field("min_password_length", &self.min_password_length)
            .field("max_failed_attempts", &self.max_failed_attempts)
            .field("lockout_duration_minutes", &self.lockout_duration_minutes)
            .field("require_complex_password", &self.require_complex_password)
            .field("default_reset_password", &"<redacted>")
            .finish()
    }
}

fn parse_env<F, T>(env: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    env(key).and_then(|value| value.trim().parse().ok())
}

fn parse_env_bool<F>(env: &F, key: &str) -> Option<bool>
where
    F: Fn(&str) -> Option<String>,
{
    let value = env(key)?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
