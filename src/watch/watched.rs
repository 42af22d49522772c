//! Mutation observing view over a shared JSON value.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLockReadGuard, RwLockWriteGuard},
};

use serde_json::Value;
use tracing::trace;

use crate::ShareLock;

use super::{
    Field,
    path::{Path, PathKey, is_container, resolve, resolve_mut},
};

pub type SetHandle = Arc<dyn Fn(&Path, &Value) + Send + Sync>;
pub type DeleteHandle = Arc<dyn Fn(&Path) + Send + Sync>;

/// Hooks fired by a [`Watched`] view.
///
/// Both run while the view holds the write lock on the data, right before
/// the change is applied, so a handler must not read or write the view.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_set: Option<SetHandle>,
    pub on_delete: Option<DeleteHandle>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_set(
        mut self,
        handle: impl Fn(&Path, &Value) + Send + Sync + 'static,
    ) -> Self {
        self.on_set = Some(Arc::new(handle));
        self
    }

    pub fn on_delete(
        mut self,
        handle: impl Fn(&Path) + Send + Sync + 'static,
    ) -> Self {
        self.on_delete = Some(Arc::new(handle));
        self
    }

    fn set(
        &self,
        path: &Path,
        value: &Value,
    ) {
        trace!("watch::set({path})");
        if let Some(handle) = &self.on_set {
            handle(path, value);
        }
    }

    fn delete(
        &self,
        path: &Path,
    ) {
        trace!("watch::delete({path})");
        if let Some(handle) = &self.on_delete {
            handle(path);
        }
    }
}

/// Array writes may pad at most this many nulls past the current end.
pub const MAX_ARRAY_GROWTH: usize = 1 << 20;

/// Records when slots of shared data were replaced or shifted.
///
/// A view remembers the epoch it was created in. Once anything on its path
/// changes identity after that, the view is stale: it no longer points at
/// the value it was read from. Only mutated while the data write lock is
/// held.
#[derive(Debug, Default)]
pub(crate) struct History {
    epoch: u64,
    /// Epoch at which the value at a path was replaced or removed.
    slots: HashMap<Vec<PathKey>, u64>,
    /// Epoch at which every child of the container at a path moved.
    children: HashMap<Vec<PathKey>, u64>,
}

pub(crate) type ShareHistory = Arc<Mutex<History>>;

impl History {
    pub fn shared() -> ShareHistory {
        Arc::new(Mutex::new(History::default()))
    }

    fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The value at `path` was replaced by a different one.
    fn replaced(
        &mut self,
        path: &Path,
        old: &Value,
    ) {
        if is_container(old) {
            self.epoch += 1;
            self.slots.insert(path.keys().to_vec(), self.epoch);
        }
    }

    /// Children of the container at `path` no longer sit where they were.
    pub fn moved(
        &mut self,
        path: &Path,
    ) {
        self.epoch += 1;
        self.children.insert(path.keys().to_vec(), self.epoch);
    }

    fn is_current(
        &self,
        path: &Path,
        born: u64,
    ) -> bool {
        let keys = path.keys();
        let changed = |map: &HashMap<Vec<PathKey>, u64>, n: usize| map.get(&keys[..n]).is_some_and(|at| *at > born);
        !(1..=keys.len()).any(|n| changed(&self.slots, n)) && !(0..keys.len()).any(|n| changed(&self.children, n))
    }
}

/// A view onto the container found at `path` inside shared data.
///
/// Child views are created lazily on read and follow the value they were
/// read from: once that value is removed, replaced or shifted to another
/// index, the view is stale. A stale view reads as absent and ignores
/// writes without firing a callback, as does a view whose path finds no
/// suitable container.
#[derive(Clone)]
pub struct Watched {
    data: ShareLock<Value>,
    history: ShareHistory,
    born: u64,
    path: Path,
    callbacks: Callbacks,
}

impl fmt::Debug for Watched {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Watched").field("path", &self.path.to_string()).field("value", &self.value()).finish()
    }
}

impl Watched {
    /// Watch the whole of `data`.
    ///
    /// Views derived from one root share its history; separate roots over
    /// the same data do not see each other's structural changes.
    pub fn new(
        data: ShareLock<Value>,
        callbacks: Callbacks,
    ) -> Self {
        Self::with_history(data, History::shared(), callbacks)
    }

    pub(crate) fn with_history(
        data: ShareLock<Value>,
        history: ShareHistory,
        callbacks: Callbacks,
    ) -> Self {
        Self {
            data,
            history,
            born: 0,
            path: Path::root(),
            callbacks,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Child view at `key`, without checking that it exists.
    ///
    /// A child of a stale view is stale as well.
    pub fn at(
        &self,
        key: impl Into<PathKey>,
    ) -> Watched {
        let history = self.history();
        let born = if history.is_current(&self.path, self.born) {
            history.epoch()
        } else {
            self.born
        };
        drop(history);
        Watched {
            data: self.data.clone(),
            history: self.history.clone(),
            born,
            path: self.path.child(key),
            callbacks: self.callbacks.clone(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Value> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Value> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn history(&self) -> MutexGuard<'_, History> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self) -> bool {
        self.history().is_current(&self.path, self.born)
    }

    /// The value this view points at, unless the view is stale.
    fn target<'a>(
        &self,
        data: &'a Value,
    ) -> Option<&'a Value> {
        if !self.is_current() {
            return None;
        }
        resolve(data, &self.path)
    }

    fn target_mut<'a>(
        &self,
        data: &'a mut Value,
    ) -> Option<&'a mut Value> {
        if !self.is_current() {
            return None;
        }
        resolve_mut(data, &self.path)
    }

    /// Reads `key`: containers come back watched, scalars as plain values.
    pub fn get(
        &self,
        key: impl Into<PathKey>,
    ) -> Option<Field<Watched>> {
        let data = self.read();
        let child = self.at(key);
        let value = child.target(&data)?;
        if is_container(value) {
            Some(Field::Nested(child))
        } else {
            Some(Field::Value(value.clone()))
        }
    }

    /// Snapshot of the value this view points at.
    pub fn value(&self) -> Option<Value> {
        self.target(&self.read()).cloned()
    }

    pub fn exists(&self) -> bool {
        self.target(&self.read()).is_some()
    }

    pub fn contains_key(
        &self,
        key: impl Into<PathKey>,
    ) -> bool {
        let key = key.into();
        match self.target(&self.read()) {
            Some(Value::Object(map)) => map.contains_key(&key.as_member()),
            Some(Value::Array(items)) => key.as_index().is_some_and(|i| i < items.len()),
            _ => false,
        }
    }

    /// Member count of an object, element count of an array, 0 otherwise.
    pub fn len(&self) -> usize {
        match self.target(&self.read()) {
            Some(Value::Object(map)) => map.len(),
            Some(Value::Array(items)) => items.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<PathKey> {
        match self.target(&self.read()) {
            Some(Value::Object(map)) => map.keys().map(PathKey::from).collect(),
            Some(Value::Array(items)) => (0..items.len()).map(PathKey::Index).collect(),
            _ => Vec::new(),
        }
    }

    /// Assigns `key`. Array assignment past the end pads with nulls, up to
    /// [`MAX_ARRAY_GROWTH`] of them.
    pub fn set(
        &self,
        key: impl Into<PathKey>,
        value: impl Into<Value>,
    ) -> bool {
        let key = key.into();
        let value = value.into();
        let mut data = self.write();
        let Some(target) = self.target_mut(&mut data) else {
            return false;
        };
        match target {
            Value::Object(map) => {
                let path = self.path.child(key.clone());
                self.callbacks.set(&path, &value);
                if let Some(old) = map.insert(key.as_member(), value) {
                    self.history().replaced(&path, &old);
                }
                true
            }
            Value::Array(items) => {
                let Some(index) = key.as_index() else {
                    return false;
                };
                if index.saturating_sub(items.len()) > MAX_ARRAY_GROWTH {
                    return false;
                }
                let path = self.path.child(index);
                self.callbacks.set(&path, &value);
                if index < items.len() {
                    let old = std::mem::replace(&mut items[index], value);
                    self.history().replaced(&path, &old);
                } else {
                    items.resize(index, Value::Null);
                    items.push(value);
                }
                true
            }
            _ => false,
        }
    }

    /// Deletes `key`. Array elements after it shift down.
    pub fn remove(
        &self,
        key: impl Into<PathKey>,
    ) -> Option<Value> {
        let key = key.into();
        let mut data = self.write();
        match self.target_mut(&mut data)? {
            Value::Object(map) => {
                let member = key.as_member();
                if !map.contains_key(&member) {
                    return None;
                }
                let path = self.path.child(key);
                self.callbacks.delete(&path);
                let old = map.remove(&member)?;
                self.history().replaced(&path, &old);
                Some(old)
            }
            Value::Array(items) => {
                let index = key.as_index().filter(|i| *i < items.len())?;
                self.callbacks.delete(&self.path.child(index));
                self.history().moved(&self.path);
                Some(items.remove(index))
            }
            _ => None,
        }
    }

    /// Appends to the array at this path.
    pub fn push(
        &self,
        value: impl Into<Value>,
    ) -> bool {
        let value = value.into();
        let mut data = self.write();
        let Some(Value::Array(items)) = self.target_mut(&mut data) else {
            return false;
        };
        self.callbacks.set(&self.path.child(items.len()), &value);
        items.push(value);
        true
    }

    pub fn pop(&self) -> Option<Value> {
        let mut data = self.write();
        let Some(Value::Array(items)) = self.target_mut(&mut data) else {
            return None;
        };
        let path = self.path.child(items.len().checked_sub(1)?);
        self.callbacks.delete(&path);
        let old = items.pop()?;
        self.history().replaced(&path, &old);
        Some(old)
    }

    /// Inserts into the array at this path; `index` may equal the length.
    pub fn insert(
        &self,
        index: usize,
        value: impl Into<Value>,
    ) -> bool {
        let value = value.into();
        let mut data = self.write();
        let Some(Value::Array(items)) = self.target_mut(&mut data) else {
            return false;
        };
        if index > items.len() {
            return false;
        }
        self.callbacks.set(&self.path.child(index), &value);
        if index < items.len() {
            self.history().moved(&self.path);
        }
        items.insert(index, value);
        true
    }

    /// Shrinks or null-pads the array at this path to `len` elements.
    pub fn set_len(
        &self,
        len: usize,
    ) -> bool {
        let mut data = self.write();
        let Some(Value::Array(items)) = self.target_mut(&mut data) else {
            return false;
        };
        if len.saturating_sub(items.len()) > MAX_ARRAY_GROWTH {
            return false;
        }
        if items.len() != len {
            self.callbacks.set(&self.path.child("length"), &Value::from(len));
            self.history().moved(&self.path);
            items.resize(len, Value::Null);
        }
        true
    }

    /// Empties the object or array at this path.
    pub fn clear(&self) -> bool {
        let mut data = self.write();
        let Some(target) = self.target_mut(&mut data) else {
            return false;
        };
        match target {
            Value::Object(map) if !map.is_empty() => {
                self.callbacks.delete(&self.path);
                self.history().moved(&self.path);
                map.clear();
            }
            Value::Array(items) if !items.is_empty() => {
                self.callbacks.delete(&self.path);
                self.history().moved(&self.path);
                items.clear();
            }
            Value::Object(_) | Value::Array(_) => {}
            _ => return false,
        }
        true
    }

    /// Replaces the value at this path wholesale. Views below it go stale.
    pub fn replace(
        &self,
        value: impl Into<Value>,
    ) -> bool {
        let value = value.into();
        let mut data = self.write();
        let Some(target) = self.target_mut(&mut data) else {
            return false;
        };
        self.callbacks.set(&self.path, &value);
        self.history().moved(&self.path);
        *target = value;
        true
    }

    /// Runs an arbitrary in-place mutation (sort, retain, ...) on the value
    /// at this path. `on_set` fires with the result before the lock is
    /// released, and views below it go stale.
    pub fn update<R>(
        &self,
        f: impl FnOnce(&mut Value) -> R,
    ) -> Option<R> {
        let mut data = self.write();
        let target = self.target_mut(&mut data)?;
        let result = f(&mut *target);
        self.callbacks.set(&self.path, target);
        self.history().moved(&self.path);
        Some(result)
    }
}
