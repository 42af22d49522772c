//! Views handed out for entry data.
//!
//! - [`Watched`]: reports every write or delete anywhere below it
//! - [`Frozen`]: deeply immutable snapshot
//! - [`View`]: either of the two, as returned by the stash

mod frozen;
mod path;
mod view;
mod watched;

use std::sync::{Arc, RwLock};

use serde_json::Value;

pub use frozen::{Frozen, freeze};
pub use path::{Path, PathKey};
pub use view::View;
pub use watched::{Callbacks, DeleteHandle, MAX_ARRAY_GROWTH, SetHandle, Watched};
pub(crate) use watched::{History, ShareHistory};

/// Result of reading one key through a view.
#[derive(Debug, Clone)]
pub enum Field<V> {
    /// A scalar, passed through unchanged.
    Value(Value),
    /// An object or array, wrapped like its parent.
    Nested(V),
}

impl<V> Field<V> {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Field::Value(value) => Some(value),
            Field::Nested(_) => None,
        }
    }

    pub fn into_nested(self) -> Option<V> {
        match self {
            Field::Value(_) => None,
            Field::Nested(view) => Some(view),
        }
    }
}

/// Wraps `value` for observation. Scalars come back unchanged.
pub fn wrap(
    value: Value,
    callbacks: Callbacks,
) -> Field<Watched> {
    if path::is_container(&value) {
        Field::Nested(Watched::new(Arc::new(RwLock::new(value)), callbacks))
    } else {
        Field::Value(value)
    }
}
