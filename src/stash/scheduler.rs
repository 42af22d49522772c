use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use futures::future::join_all;
use strum::AsRefStr;
use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::debug;

use crate::{StashError, common::Shutdown, diag::Diag, registry::Registry, store::Storage, utils::time as clock};

/// Why a save did not run for this pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
pub enum SkipReason {
    #[strum(serialize = "not found")]
    NotFound,
    #[strum(serialize = "readonly")]
    Readonly,
    #[strum(serialize = "failed to load")]
    LoadFailed,
    #[strum(serialize = "too busy")]
    Busy,
}

/// Result of one save attempt for one entry.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Saved,
    Failed(StashError),
    Skipped(SkipReason),
}

/// Marks a name as saving for as long as it is alive.
struct InFlight<'a> {
    saving: &'a Mutex<HashSet<String>>,
    name: String,
}

impl<'a> InFlight<'a> {
    fn acquire(
        saving: &'a Mutex<HashSet<String>>,
        name: &str,
    ) -> Option<Self> {
        let mut names = saving.lock().unwrap_or_else(PoisonError::into_inner);
        if !names.insert(name.to_string()) {
            return None;
        }
        Some(Self {
            saving,
            name: name.to_string(),
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.saving.lock().unwrap_or_else(PoisonError::into_inner).remove(&self.name);
    }
}

/// Periodically persists dirty entries, at most one save per name at a time.
pub(crate) struct Scheduler {
    registry: Arc<Registry>,
    storage: Arc<dyn Storage>,
    diag: Diag,
    saving: Mutex<HashSet<String>>,
    period: Duration,
}

impl Scheduler {
    pub fn new(
        registry: Arc<Registry>,
        storage: Arc<dyn Storage>,
        diag: Diag,
        period: Duration,
    ) -> Self {
        Self {
            registry,
            storage,
            diag,
            saving: Mutex::new(HashSet::new()),
            period,
        }
    }

    /// Spawns the timer task. The first pass runs one full period from now.
    pub fn start(
        self: &Arc<Self>,
        shutdown: &Shutdown,
    ) -> JoinHandle<()> {
        let scheduler = self.clone();
        let stop = shutdown.wait();
        tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + scheduler.period, scheduler.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tokio::pin!(stop);
            loop {
                tokio::select! {
                    _ = &mut stop => break,
                    _ = interval.tick() => {
                        scheduler.tick();
                    }
                }
            }
            debug!("scheduler stopped");
        })
    }

    /// Starts one save per dirty entry without waiting for them.
    pub fn tick(self: &Arc<Self>) -> Vec<JoinHandle<SaveOutcome>> {
        let dirty = self.registry.dirty();
        debug!("scheduler::tick({} dirty)", dirty.len());
        dirty
            .into_iter()
            .map(|name| {
                let scheduler = self.clone();
                tokio::spawn(async move { scheduler.save(&name).await })
            })
            .collect()
    }

    /// Saves every dirty entry now and waits for the results.
    pub async fn flush(self: &Arc<Self>) -> Vec<(String, SaveOutcome)> {
        let dirty = self.registry.dirty();
        let saves = dirty.iter().map(|name| self.save(name));
        dirty.iter().cloned().zip(join_all(saves).await).collect()
    }

    pub fn in_flight(&self) -> usize {
        self.saving.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn skip(
        &self,
        name: &str,
        reason: SkipReason,
    ) -> SaveOutcome {
        self.diag.warn(&format!("stash [data:{name}] *NOT* saved ({})", reason.as_ref()));
        SaveOutcome::Skipped(reason)
    }

    pub async fn save(
        &self,
        name: &str,
    ) -> SaveOutcome {
        let Some(entry) = self.registry.lookup(name) else {
            return self.skip(name, SkipReason::NotFound);
        };
        if entry.is_readonly() {
            return self.skip(name, SkipReason::Readonly);
        }
        if entry.load_error().is_some() {
            return self.skip(name, SkipReason::LoadFailed);
        }
        let Some(_in_flight) = InFlight::acquire(&self.saving, name) else {
            return self.skip(name, SkipReason::Busy);
        };
        let Some(data) = entry.take_snapshot() else {
            return self.skip(name, SkipReason::Readonly);
        };

        let start = clock::time_millis();
        match self.storage.save(name, &data).await {
            Ok(()) => {
                entry.save_succeeded();
                self.diag.info(&format!("stash [data:{name}] saved, {} ms", clock::elapsed_millis(start)));
                SaveOutcome::Saved
            }
            Err(e) => {
                entry.save_failed(e.clone());
                self.diag.warn(&format!("stash [data:{name}] *NOT* saved (error): {e}"));
                SaveOutcome::Failed(e)
            }
        }
    }
}
