//! Entry registry: one lifecycle record per name.

use std::{
    collections::HashMap,
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicBool, Ordering},
    },
};

use serde::Serialize;
use serde_json::Value;
use tracing::trace;

use crate::{
    ShareLock, StashError,
    watch::{Callbacks, Frozen, History, Path, ShareHistory, View, Watched, freeze},
};

fn is_false(value: &bool) -> bool {
    !*value
}

/// Snapshot of an entry's lifecycle flags.
///
/// Serializes only the fields that are set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntryStatus {
    /// The name was never passed to `get` or `set`.
    #[serde(skip_serializing_if = "is_false")]
    pub init_error: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub readonly: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_error: Option<StashError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_error: Option<StashError>,
}

impl EntryStatus {
    pub fn uninitialized() -> Self {
        Self {
            init_error: true,
            ..Default::default()
        }
    }
}

enum Slot {
    Writable {
        data: ShareLock<Value>,
        history: ShareHistory,
    },
    Readonly(Frozen),
}

#[derive(Default)]
struct Errors {
    load: Option<StashError>,
    save: Option<StashError>,
}

pub(crate) struct Entry {
    slot: Slot,
    changed: Arc<AtomicBool>,
    errors: RwLock<Errors>,
}

impl Entry {
    /// A readonly entry is never dirty, whatever `changed` says.
    pub fn new(
        data: Value,
        readonly: bool,
        changed: bool,
        load_error: Option<StashError>,
    ) -> Self {
        let slot = if readonly {
            Slot::Readonly(freeze(data))
        } else {
            Slot::Writable {
                data: Arc::new(RwLock::new(data)),
                history: History::shared(),
            }
        };
        Self {
            slot,
            changed: Arc::new(AtomicBool::new(changed && !readonly)),
            errors: RwLock::new(Errors {
                load: load_error,
                save: None,
            }),
        }
    }

    pub fn is_readonly(&self) -> bool {
        matches!(self.slot, Slot::Readonly(_))
    }

    pub fn is_changed(&self) -> bool {
        self.changed.load(Ordering::SeqCst)
    }

    pub fn load_error(&self) -> Option<StashError> {
        self.errors.read().unwrap_or_else(PoisonError::into_inner).load.clone()
    }

    /// Caller-facing view; writes through it mark the entry dirty.
    pub fn view(
        &self,
        name: &str,
    ) -> View {
        match &self.slot {
            Slot::Readonly(frozen) => View::Frozen(frozen.clone()),
            Slot::Writable { data, history } => {
                let on_set = (self.changed.clone(), name.to_string());
                let on_delete = on_set.clone();
                let callbacks = Callbacks::new()
                    .on_set(move |path, _| {
                        trace!("[{}] set {path}", on_set.1);
                        on_set.0.store(true, Ordering::SeqCst);
                    })
                    .on_delete(move |path| {
                        trace!("[{}] delete {path}", on_delete.1);
                        on_delete.0.store(true, Ordering::SeqCst);
                    });
                View::Watched(Watched::with_history(data.clone(), history.clone(), callbacks))
            }
        }
    }

    /// Swaps in new data for a writable entry; readonly entries are left alone.
    ///
    /// Root views handed out earlier see the new data, nested ones go stale.
    pub fn replace(
        &self,
        value: Value,
    ) -> bool {
        let Slot::Writable { data, history } = &self.slot else {
            return false;
        };
        let mut data = data.write().unwrap_or_else(PoisonError::into_inner);
        history.lock().unwrap_or_else(PoisonError::into_inner).moved(&Path::root());
        *data = value;
        self.changed.store(true, Ordering::SeqCst);
        *self.errors.write().unwrap_or_else(PoisonError::into_inner) = Errors::default();
        true
    }

    /// Copy of the data to persist. Clears the dirty flag under the data
    /// lock so that any later write marks the entry dirty again.
    pub fn take_snapshot(&self) -> Option<Value> {
        let Slot::Writable { data, .. } = &self.slot else {
            return None;
        };
        let data = data.read().unwrap_or_else(PoisonError::into_inner);
        self.changed.store(false, Ordering::SeqCst);
        Some(data.clone())
    }

    pub fn save_succeeded(&self) {
        self.errors.write().unwrap_or_else(PoisonError::into_inner).save = None;
    }

    pub fn save_failed(
        &self,
        error: StashError,
    ) {
        self.errors.write().unwrap_or_else(PoisonError::into_inner).save = Some(error);
        self.changed.store(true, Ordering::SeqCst);
    }

    pub fn status(&self) -> EntryStatus {
        let errors = self.errors.read().unwrap_or_else(PoisonError::into_inner);
        EntryStatus {
            init_error: false,
            readonly: self.is_readonly(),
            changed: self.is_changed(),
            load_error: errors.load.clone(),
            save_error: errors.save.clone(),
        }
    }
}

/// Name to entry map. A name is present once it has been accessed.
#[derive(Default)]
pub(crate) struct Registry {
    entries: RwLock<HashMap<String, Arc<Entry>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(
        &self,
        name: &str,
    ) -> Option<Arc<Entry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).get(name).cloned()
    }

    /// Inserts `entry` unless another caller created `name` first; returns
    /// whichever entry ends up registered.
    pub fn insert_if_absent(
        &self,
        name: &str,
        entry: Entry,
    ) -> Arc<Entry> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.entry(name.to_string()).or_insert_with(|| Arc::new(entry)).clone()
    }

    /// Replaces the data of `name`, creating the entry if needed. An
    /// existing readonly entry is returned untouched.
    pub fn set(
        &self,
        name: &str,
        data: Value,
        readonly: bool,
    ) -> Arc<Entry> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get(name) {
            Some(entry) => {
                entry.replace(data);
                entry.clone()
            }
            None => {
                let entry = Arc::new(Entry::new(data, readonly, true, None));
                entries.insert(name.to_string(), entry.clone());
                entry
            }
        }
    }

    /// Names of the entries that are currently dirty.
    pub fn dirty(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.iter().filter(|(_, entry)| entry.is_changed()).map(|(name, _)| name.clone()).collect()
    }

    pub fn status(
        &self,
        name: &str,
    ) -> EntryStatus {
        match self.lookup(name) {
            Some(entry) => entry.status(),
            None => EntryStatus::uninitialized(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}
