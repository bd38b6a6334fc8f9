//! Error types for histver-core
//!
//! Each collaborator module owns its own error enum next to its code
//! ([`crate::ledger::LedgerError`], [`crate::git::GitError`], ...). This
//! module holds the configuration errors shared by the loader and its callers.

use thiserror::Error;

/// Errors that can occur when working with configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error("invalid configuration: {0}")]
    Deserialize(#[from] Box<figment::Error>),

    /// A key deserialized but holds an unusable value.
    #[error("invalid value for `{key}`: {reason}")]
    InvalidValue {
        /// Dotted key path, e.g. `ledger.path`.
        key: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Result type alias using [`ConfigError`].
pub type ConfigResult<T> = Result<T, ConfigError>;
