//! # Stashkv
//!
//! Stashkv is a write-back, in-memory object cache backed by pluggable
//! durable storage. Callers fetch a named JSON value, mutate it in place,
//! and the stash notices and persists the change on its next save pass.
//!
//! ## Core Features
//!
//! - **Mutation Tracking**: Views report every write or delete at any depth
//! - **Write-back Persistence**: Dirty entries are saved periodically, one save per name at a time
//! - **Readonly Entries**: Deeply frozen views that silently ignore writes
//! - **Pluggable Storage**: JSON files (default) or in-memory, or any [`Storage`] implementation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stashkv::{GetOptions, StashBuilder};
//!
//! let stash = StashBuilder::new().save_period(10).build().await?;
//!
//! let settings = stash.get("settings", GetOptions::default()).await;
//! settings.set("theme", "dark");
//!
//! // persisted within 10 seconds
//! ```

mod builder;
mod common;
mod config;
mod diag;
mod error;
mod registry;
mod stash;
mod store;
mod utils;
pub mod watch;

use std::sync::{Arc, RwLock};

pub use builder::StashBuilder;
pub use config::{Config, FileConfig, StoreConfig, StoreType};
pub use diag::Logger;
pub use error::StashError;
pub use registry::EntryStatus;
pub use stash::{GetOptions, Options, SaveOutcome, SetOptions, SkipReason, Stash};
pub use store::{ConnectOptions, FileStore, MemStore, Storage};
pub use watch::{Field, Frozen, View, Watched};

/// Result type alias for Stashkv operations.
pub type Result<T> = std::result::Result<T, StashError>;

/// Thread-safe shared lock wrapper using Arc<RwLock<T>>.
pub(crate) type ShareLock<T> = Arc<RwLock<T>>;
