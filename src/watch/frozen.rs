//! Deeply immutable snapshot of a JSON value.

use std::sync::Arc;

use serde_json::Value;

use super::{
    Field,
    path::{Path, PathKey, is_container, resolve},
};

/// Read-only view over a snapshot.
///
/// Children share the snapshot and only extend the path. There are no
/// mutating methods; [`View`](super::View) turns writes on a frozen view
/// into silent no-ops.
#[derive(Debug, Clone)]
pub struct Frozen {
    root: Arc<Value>,
    path: Path,
}

/// Freezes `value`.
pub fn freeze(value: Value) -> Frozen {
    Frozen {
        root: Arc::new(value),
        path: Path::root(),
    }
}

impl Frozen {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Borrow of the value this view points at.
    pub fn as_value(&self) -> Option<&Value> {
        resolve(&self.root, &self.path)
    }

    pub fn value(&self) -> Option<Value> {
        self.as_value().cloned()
    }

    pub fn get(
        &self,
        key: impl Into<PathKey>,
    ) -> Option<Field<Frozen>> {
        let path = self.path.child(key);
        let value = resolve(&self.root, &path)?;
        if is_container(value) {
            Some(Field::Nested(Frozen {
                root: self.root.clone(),
                path,
            }))
        } else {
            Some(Field::Value(value.clone()))
        }
    }

    pub fn contains_key(
        &self,
        key: impl Into<PathKey>,
    ) -> bool {
        resolve(&self.root, &self.path.child(key)).is_some()
    }

    pub fn len(&self) -> usize {
        match self.as_value() {
            Some(Value::Object(map)) => map.len(),
            Some(Value::Array(items)) => items.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<PathKey> {
        match self.as_value() {
            Some(Value::Object(map)) => map.keys().map(PathKey::from).collect(),
            Some(Value::Array(items)) => (0..items.len()).map(PathKey::Index).collect(),
            _ => Vec::new(),
        }
    }
}
