#![warn(missing_docs)]
//! # labhost-contract-tests
//!
//! Locates the frozen JSON schemas and fixtures under the workspace
//! `contracts/` directory. The checks themselves live in `tests/`.

use std::path::PathBuf;

/// Absolute path of the workspace `contracts/` directory.
pub fn contracts_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../contracts")
}

/// Path of a schema or fixture relative to `contracts/`.
pub fn contract_path(relative: &str) -> PathBuf {
    contracts_dir().join(relative)
}
