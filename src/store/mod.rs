//! Storage layer for persisting entries.
//!
//! Provides an abstraction over different storage backends:
//! - `MemStore`: In-memory storage for testing
//! - `FileStore`: One JSON file per entry, the default

mod db;

use std::error::Error;

use async_trait::async_trait;
use serde_json::Value;

use crate::{Result, StashError};

pub use db::{FileStore, MemStore};

/// Maps backend errors to StashError.
fn map_db_err(err: impl Error) -> StashError {
    StashError::Store(err.to_string())
}

/// Options handed to [`Storage::connect`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Nothing will ever be saved; the backend must not create anything.
    pub readonly: bool,
}

/// Durable storage behind the stash.
///
/// `save` may be called repeatedly for the same name and must never leave a
/// half-written value behind.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Prepares the backend. Called once by `Stash::init`; an error aborts it.
    async fn connect(
        &self,
        options: &ConnectOptions,
    ) -> Result<()>;

    /// Returns the stored value for `name`, or an error if absent or corrupt.
    async fn load(
        &self,
        name: &str,
    ) -> Result<Value>;

    /// Durably stores `data` under `name`.
    async fn save(
        &self,
        name: &str,
        data: &Value,
    ) -> Result<()>;
}
