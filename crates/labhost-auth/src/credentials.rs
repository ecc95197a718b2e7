//! Account records, salted password hashes and the credential store seam.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use labhost_core::SecurityPolicy;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::AuthError;

const SALT_LEN: usize = 16;
const HASH_ROUNDS: u32 = 1_000;

/// Role attached to an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountRole {
    /// May reset passwords and unlock accounts.
    Administrator,
    /// Laboratory technician.
    Technician,
    /// Read-only user.
    Viewer,
}

/// Public account identity handed to the session layer after login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Login identifier.
    pub id: String,
    /// Name shown in the main window.
    pub display_name: String,
    /// Granted role.
    pub role: AccountRole,
}

impl Account {
    /// Returns `true` for administrators.
    pub fn is_administrator(&self) -> bool {
        self.role == AccountRole::Administrator
    }
}

/// Salted, iterated SHA-256 password hash.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash {
    salt: [u8; SALT_LEN],
    digest: [u8; 32],
}

impl PasswordHash {
    /// Hashes `secret` with a fresh random salt.
    pub fn derive(secret: &str) -> Self {
        let mut salt = [0_u8; SALT_LEN];
        StdRng::from_os_rng().fill_bytes(&mut salt);
        Self::derive_with_salt(secret, salt)
    }

    /// Hashes `secret` with a caller-provided salt.
    pub fn derive_with_salt(secret: &str, salt: [u8; SALT_LEN]) -> Self {
        Self {
            salt,
            digest: stretch(&salt, secret),
        }
    }

    /// Returns `true` when `secret` produces this hash.
    pub fn verify(&self, secret: &str) -> bool {
        stretch(&self.salt, secret) == self.digest
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHash(<redacted>)")
    }
}

fn stretch(salt: &[u8], secret: &str) -> [u8; 32] {
    let mut digest: [u8; 32] = Sha256::new()
        .chain_update(salt)
        .chain_update(secret.as_bytes())
        .finalize()
        .into();
    for _ in 1..HASH_ROUNDS {
        digest = Sha256::new()
            .chain_update(salt)
            .chain_update(digest)
            .finalize()
            .into();
    }
    digest
}

/// Stored account plus its password hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    /// Public identity.
    pub account: Account,
    /// Current password hash.
    pub password: PasswordHash,
}

/// Account persistence seam. The real store lives outside this crate.
pub trait CredentialStore: Send + Sync {
    /// Looks up an account by identifier.
    fn find(&self, account_id: &str) -> Option<AccountRecord>;

    /// Replaces an account's password hash.
    ///
    /// # Errors
    /// Returns [`AuthError::UnknownAccount`] when the account does not exist,
    /// or [`AuthError::Store`] for backend failures.
    fn update_password(&self, account_id: &str, password: PasswordHash) -> Result<(), AuthError>;
}

/// Process-local credential store.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    records: RwLock<HashMap<String, AccountRecord>>,
}

impl InMemoryCredentialStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an account with the given plain-text secret.
    pub fn insert(&self, account: Account, secret: &str) {
        let record = AccountRecord {
            password: PasswordHash::derive(secret),
            account,
        };
        self.records
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(record.account.id.clone(), record);
    }

    /// Returns the number of stored accounts.
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Returns `true` when no accounts are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn find(&self, account_id: &str) -> Option<AccountRecord> {
        self.records
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(account_id)
            .cloned()
    }

    fn update_password(&self, account_id: &str, password: PasswordHash) -> Result<(), AuthError> {
        let mut records = self
            .records
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let record = records
            .get_mut(account_id)
            .ok_or_else(|| AuthError::UnknownAccount(account_id.to_string()))?;
        record.password = password;
        Ok(())
    }
}

/// Checks a candidate password against the policy.
///
/// # Errors
/// Returns [`AuthError::WeakPassword`] naming the first unmet rule.
pub fn validate_password(policy: &SecurityPolicy, candidate: &str) -> Result<(), AuthError> {
    if candidate.chars().count() < policy.min_password_length {
        return Err(AuthError::WeakPassword(format!(
            "must be at least {} characters",
            policy.min_password_length
        )));
    }

    if policy.require_complex_password {
        let rules: [(&str, fn(char) -> bool); 4] = [
            ("an uppercase letter", char::is_uppercase),
            ("a lowercase letter", char::is_lowercase),
            ("a digit", |c| c.is_ascii_digit()),
            ("a symbol", |c| !c.is_alphanumeric() && !c.is_whitespace()),
        ];
        for (label, rule) in rules {
            if !candidate.chars().any(rule) {
                return Err(AuthError::WeakPassword(format!("must contain {label}")));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_verifies_only_matching_secret() {
        let hash = PasswordHash::derive("Sample#42");
        assert!(hash.verify("Sample#42"));
        assert!(!hash.verify("sample#42"));
    }

    #[test]
    fn fresh_salts_produce_distinct_hashes() {
        assert_ne!(PasswordHash::derive("same"), PasswordHash::derive("same"));
    }

    #[test]
    fn policy_enforces_length_and_complexity() {
        let mut policy = SecurityPolicy::default();
        assert!(validate_password(&policy, "abc").is_err());
        assert!(validate_password(&policy, "abcd").is_ok());

        policy.require_complex_password = true;
        let error = validate_password(&policy, "abcd").expect_err("needs classes");
        assert!(error.to_string().contains("uppercase"));
        assert!(validate_password(&policy, "Ab3$").is_ok());
    }

    #[test]
    fn update_password_requires_existing_account() {
        let store = InMemoryCredentialStore::new();
        let error = store
            .update_password("ghost", PasswordHash::derive("x"))
            .expect_err("unknown account");
        assert!(matches!(error, AuthError::UnknownAccount(_)));
    }
}
