//! Error types for Stashkv.
//!
//! All errors in Stashkv are represented by the `StashError` enum.
//! Load and save errors are recorded on entries rather than returned,
//! so the type is cloneable and comparable.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all Stashkv operations.
#[derive(Deserialize, Serialize, Error, Debug, Clone, PartialEq)]
pub enum StashError {
    /// Initialization errors (backend connect failure, unusable options).
    #[error("{0}")]
    Init(String),

    /// Configuration parsing or validation errors.
    #[error("{0}")]
    Config(String),

    /// Data conversion errors (JSON, TOML).
    #[error("{0}")]
    Convert(String),

    /// Backend-level errors not tied to a single load or save.
    #[error("{0}")]
    Store(String),

    /// Loading an entry from the backend failed.
    #[error("{0}")]
    Load(String),

    /// Saving an entry to the backend failed.
    #[error("{0}")]
    Save(String),

    /// I/O operation errors.
    #[error("{0}")]
    IoError(String),
}

impl From<std::io::Error> for StashError {
    fn from(error: std::io::Error) -> Self {
        StashError::IoError(error.to_string())
    }
}

impl From<serde_json::Error> for StashError {
    fn from(error: serde_json::Error) -> Self {
        StashError::Convert(error.to_string())
    }
}

impl From<toml::de::Error> for StashError {
    fn from(error: toml::de::Error) -> Self {
        StashError::Config(error.to_string())
    }
}
