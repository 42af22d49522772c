use serde_json::Value;

use super::{Field, Frozen, PathKey, Watched};

/// What the stash hands out for an entry.
///
/// Writes on a frozen view are rejected silently: setters return `false`,
/// removals return `None`, nothing changes.
#[derive(Debug, Clone)]
pub enum View {
    Watched(Watched),
    Frozen(Frozen),
}

impl View {
    pub fn is_readonly(&self) -> bool {
        matches!(self, View::Frozen(_))
    }

    pub fn get(
        &self,
        key: impl Into<PathKey>,
    ) -> Option<Field<View>> {
        match self {
            View::Watched(w) => w.get(key).map(|field| match field {
                Field::Value(value) => Field::Value(value),
                Field::Nested(child) => Field::Nested(View::Watched(child)),
            }),
            View::Frozen(f) => f.get(key).map(|field| match field {
                Field::Value(value) => Field::Value(value),
                Field::Nested(child) => Field::Nested(View::Frozen(child)),
            }),
        }
    }

    /// Scalar at `key`, or the snapshot of the container there.
    pub fn get_value(
        &self,
        key: impl Into<PathKey>,
    ) -> Option<Value> {
        match self.get(key)? {
            Field::Value(value) => Some(value),
            Field::Nested(child) => child.value(),
        }
    }

    pub fn value(&self) -> Option<Value> {
        match self {
            View::Watched(w) => w.value(),
            View::Frozen(f) => f.value(),
        }
    }

    pub fn contains_key(
        &self,
        key: impl Into<PathKey>,
    ) -> bool {
        match self {
            View::Watched(w) => w.contains_key(key),
            View::Frozen(f) => f.contains_key(key),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            View::Watched(w) => w.len(),
            View::Frozen(f) => f.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<PathKey> {
        match self {
            View::Watched(w) => w.keys(),
            View::Frozen(f) => f.keys(),
        }
    }

    pub fn set(
        &self,
        key: impl Into<PathKey>,
        value: impl Into<Value>,
    ) -> bool {
        match self {
            View::Watched(w) => w.set(key, value),
            View::Frozen(_) => false,
        }
    }

    pub fn remove(
        &self,
        key: impl Into<PathKey>,
    ) -> Option<Value> {
        match self {
            View::Watched(w) => w.remove(key),
            View::Frozen(_) => None,
        }
    }

    pub fn push(
        &self,
        value: impl Into<Value>,
    ) -> bool {
        match self {
            View::Watched(w) => w.push(value),
            View::Frozen(_) => false,
        }
    }

    pub fn pop(&self) -> Option<Value> {
        match self {
            View::Watched(w) => w.pop(),
            View::Frozen(_) => None,
        }
    }

    pub fn insert(
        &self,
        index: usize,
        value: impl Into<Value>,
    ) -> bool {
        match self {
            View::Watched(w) => w.insert(index, value),
            View::Frozen(_) => false,
        }
    }

    pub fn set_len(
        &self,
        len: usize,
    ) -> bool {
        match self {
            View::Watched(w) => w.set_len(len),
            View::Frozen(_) => false,
        }
    }

    pub fn clear(&self) -> bool {
        match self {
            View::Watched(w) => w.clear(),
            View::Frozen(_) => false,
        }
    }

    pub fn replace(
        &self,
        value: impl Into<Value>,
    ) -> bool {
        match self {
            View::Watched(w) => w.replace(value),
            View::Frozen(_) => false,
        }
    }

    pub fn update<R>(
        &self,
        f: impl FnOnce(&mut Value) -> R,
    ) -> Option<R> {
        match self {
            View::Watched(w) => w.update(f),
            View::Frozen(_) => None,
        }
    }
}
