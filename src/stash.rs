//! The stash handle - the main entry point for Stashkv.
//!
//! A stash owns everything that has to live and die together:
//! - The entry registry
//! - The storage backend
//! - The save timer
//! - The diagnostic sink and the readonly-for-everything flag

mod scheduler;

use std::{
    fmt,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use serde_json::{Value, json};
use tokio::task::JoinHandle;

use crate::{
    Result, StashError,
    common::Shutdown,
    config::{DEFAULT_SAVE_PERIOD, MAX_SAVE_PERIOD},
    diag::{Diag, Logger},
    registry::{Entry, EntryStatus, Registry},
    store::{ConnectOptions, FileStore, Storage},
    utils::time as clock,
    watch::View,
};

pub use scheduler::{SaveOutcome, SkipReason};
use scheduler::Scheduler;

/// Options recognized by [`Stash::init`].
#[derive(Clone, Default)]
pub struct Options {
    /// Seconds between save passes; values below 1 or above a year are
    /// ignored with a warning.
    pub save_period: Option<i64>,
    /// Backend; defaults to a [`FileStore`] over `./data/`.
    pub storage: Option<Arc<dyn Storage>>,
    /// Every entry becomes readonly unless a call says otherwise.
    pub readonly: bool,
    /// Replaces the default `tracing` output for diagnostic lines.
    pub logger: Option<Logger>,
}

impl fmt::Debug for Options {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Options")
            .field("save_period", &self.save_period)
            .field("storage", &self.storage.is_some())
            .field("readonly", &self.readonly)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

/// Per-call options of [`Stash::get`]. Only used when the call creates the entry.
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    pub readonly: Option<bool>,
    /// Used, and scheduled for saving, when loading fails.
    pub default: Option<Value>,
}

impl GetOptions {
    pub fn readonly() -> Self {
        Self {
            readonly: Some(true),
            ..Default::default()
        }
    }

    pub fn with_default(
        mut self,
        default: impl Into<Value>,
    ) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Per-call options of [`Stash::set`]. Only used when the call creates the entry.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    pub readonly: Option<bool>,
}

impl SetOptions {
    pub fn readonly() -> Self {
        Self {
            readonly: Some(true),
        }
    }
}

/// Write-back object cache.
///
/// # Example
///
/// ```rust,ignore
/// let stash = Stash::init(Options::default()).await?;
///
/// let users = stash.get("users", GetOptions::default()).await;
/// users.set("alice", json!({"age": 30}));
///
/// // saved on the next pass, no explicit call needed
/// stash.deinit();
/// ```
pub struct Stash {
    registry: Arc<Registry>,
    scheduler: Arc<Scheduler>,
    storage: Arc<dyn Storage>,
    diag: Diag,
    readonly: bool,
    save_period: Duration,

    running: AtomicBool,
    timer: Mutex<Option<JoinHandle<()>>>,
    shutdown: Shutdown,
}

impl fmt::Debug for Stash {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Stash")
            .field("entries", &self.registry.len())
            .field("readonly", &self.readonly)
            .field("save_period", &self.save_period)
            .field("running", &self.is_running())
            .finish()
    }
}

fn resolve_save_period(
    requested: Option<i64>,
    diag: &Diag,
) -> u64 {
    match requested {
        None => DEFAULT_SAVE_PERIOD,
        Some(n) if n < 1 => {
            diag.warn(&format!("stash save_period should be >=1 seconds, will use default [{DEFAULT_SAVE_PERIOD}]"));
            DEFAULT_SAVE_PERIOD
        }
        Some(n) if n as u64 > MAX_SAVE_PERIOD => {
            diag.warn(&format!("stash save_period should be <={MAX_SAVE_PERIOD} seconds, will use default [{DEFAULT_SAVE_PERIOD}]"));
            DEFAULT_SAVE_PERIOD
        }
        Some(n) => {
            diag.info(&format!("stash save_period was updated [{n}]"));
            n as u64
        }
    }
}

/// Loaded data must be an object or an array.
fn require_container(value: Value) -> Result<Value> {
    match value {
        Value::Object(_) | Value::Array(_) => Ok(value),
        _ => Err(StashError::Load("not an object".to_string())),
    }
}

impl Stash {
    /// Connects the backend and starts the save timer.
    ///
    /// Must be called within a tokio runtime. Fails only when the backend
    /// cannot connect.
    pub async fn init(options: Options) -> Result<Stash> {
        let diag = Diag::new(options.logger.clone());
        if options.logger.is_some() {
            diag.info("stash logger was updated");
        }
        let save_period = Duration::from_secs(resolve_save_period(options.save_period, &diag));
        let storage = match options.storage {
            Some(storage) => {
                diag.info("stash storage was updated");
                storage
            }
            None => Arc::new(FileStore::default()),
        };

        let start = clock::time_millis();
        let connect = ConnectOptions {
            readonly: options.readonly,
        };
        if let Err(e) = storage.connect(&connect).await {
            diag.warn(&format!("stash *CANNOT* initialize: {e}"));
            return Err(StashError::Init(e.to_string()));
        }

        let registry = Arc::new(Registry::new());
        let scheduler = Arc::new(Scheduler::new(registry.clone(), storage.clone(), diag.clone(), save_period));
        let shutdown = Shutdown::new();
        let timer = scheduler.start(&shutdown);

        diag.info(&format!("stash was initialized, {} ms", clock::elapsed_millis(start)));

        Ok(Stash {
            registry,
            scheduler,
            storage,
            diag,
            readonly: options.readonly,
            save_period,
            running: AtomicBool::new(true),
            timer: Mutex::new(Some(timer)),
            shutdown,
        })
    }

    /// Stops the save timer and forgets every entry.
    ///
    /// Saves already running are left to finish. Idempotent.
    pub fn deinit(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shutdown.shutdown();
        if let Some(timer) = self.timer.lock().unwrap_or_else(PoisonError::into_inner).take() {
            timer.abort();
        }
        self.registry.clear();
        self.diag.info("stash was deinitialized");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn save_period(&self) -> Duration {
        self.save_period
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Returns the view for `name`, loading it on first access.
    ///
    /// Never fails: a failed load yields `{}` (or `options.default`) and is
    /// recorded in the entry status.
    pub async fn get(
        &self,
        name: impl ToString,
        options: GetOptions,
    ) -> View {
        let name = name.to_string();
        if let Some(entry) = self.registry.lookup(&name) {
            return entry.view(&name);
        }
        let entry = self.load(&name, options).await;
        self.registry.insert_if_absent(&name, entry).view(&name)
    }

    async fn load(
        &self,
        name: &str,
        options: GetOptions,
    ) -> Entry {
        let readonly = options.readonly.unwrap_or(self.readonly);
        let start = clock::time_millis();
        match self.storage.load(name).await.and_then(require_container) {
            Ok(data) => {
                self.diag.info(&format!("stash [data:{name}] loaded, {} ms", clock::elapsed_millis(start)));
                Entry::new(data, readonly, false, None)
            }
            Err(e) => match options.default {
                Some(default) => {
                    self.diag.warn(&format!("stash [data:{name}] *NOT* loaded, got default value: {e}"));
                    Entry::new(default, readonly, true, None)
                }
                None => {
                    self.diag.warn(&format!("stash [data:{name}] *NOT* loaded: {e}"));
                    Entry::new(json!({}), readonly, false, Some(e))
                }
            },
        }
    }

    /// Replaces the data of `name` without loading it.
    ///
    /// On an existing readonly entry this changes nothing and returns the
    /// entry's frozen view.
    pub fn set(
        &self,
        name: impl ToString,
        data: impl Into<Value>,
        options: SetOptions,
    ) -> View {
        let name = name.to_string();
        let readonly = options.readonly.unwrap_or(self.readonly);
        self.registry.set(&name, data.into(), readonly).view(&name)
    }

    pub fn get_status(
        &self,
        name: impl ToString,
    ) -> EntryStatus {
        self.registry.status(&name.to_string())
    }

    /// Runs a save pass right away and waits for it.
    pub async fn flush(&self) -> Vec<(String, SaveOutcome)> {
        self.scheduler.flush().await
    }

    /// Number of saves currently running.
    pub fn saves_in_flight(&self) -> usize {
        self.scheduler.in_flight()
    }
}

impl Drop for Stash {
    fn drop(&mut self) {
        if self.shutdown.is_shutdown() {
            return;
        }
        self.shutdown.shutdown();
        if let Some(timer) = self.timer.lock().unwrap_or_else(PoisonError::into_inner).take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::atomic::AtomicUsize};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::{MemStore, watch::Field};

    type LoadFn = Box<dyn Fn(&str) -> Result<Value> + Send + Sync>;

    /// Storage double recording every call.
    struct TestStore {
        load: LoadFn,
        connect_error: Option<StashError>,
        save_delays: HashMap<String, Duration>,
        fail_saves: AtomicBool,
        connects: AtomicUsize,
        loads: Mutex<Vec<String>>,
        saves: Mutex<Vec<(String, Value)>>,
        running: AtomicUsize,
        max_running: AtomicUsize,
    }

    impl TestStore {
        fn new(load: impl Fn(&str) -> Result<Value> + Send + Sync + 'static) -> Self {
            Self {
                load: Box::new(load),
                connect_error: None,
                save_delays: HashMap::new(),
                fail_saves: AtomicBool::new(false),
                connects: AtomicUsize::new(0),
                loads: Mutex::new(Vec::new()),
                saves: Mutex::new(Vec::new()),
                running: AtomicUsize::new(0),
                max_running: AtomicUsize::new(0),
            }
        }

        fn returning(value: Value) -> Self {
            Self::new(move |_| Ok(value.clone()))
        }

        fn loads(&self) -> Vec<String> {
            self.loads.lock().unwrap().clone()
        }

        fn saves(&self) -> Vec<(String, Value)> {
            self.saves.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Storage for TestStore {
        async fn connect(
            &self,
            _options: &ConnectOptions,
        ) -> Result<()> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            match &self.connect_error {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            }
        }

        async fn load(
            &self,
            name: &str,
        ) -> Result<Value> {
            self.loads.lock().unwrap().push(name.to_string());
            (self.load)(name)
        }

        async fn save(
            &self,
            name: &str,
            data: &Value,
        ) -> Result<()> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.save_delays.get(name) {
                tokio::time::sleep(*delay).await;
            }
            self.running.fetch_sub(1, Ordering::SeqCst);
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(StashError::Save("disk full".to_string()));
            }
            self.saves.lock().unwrap().push((name.to_string(), data.clone()));
            Ok(())
        }
    }

    type Lines = Arc<Mutex<Vec<String>>>;

    fn capture() -> (Logger, Lines) {
        let lines: Lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();
        (Arc::new(move |line: &str| sink.lock().unwrap().push(line.to_string())), lines)
    }

    async fn init_with(storage: Arc<TestStore>) -> Stash {
        Stash::init(Options {
            storage: Some(storage),
            ..Default::default()
        })
        .await
        .unwrap()
    }

    async fn pass_time(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_connect_failure() {
        let mut store = TestStore::returning(json!({}));
        store.connect_error = Some(StashError::Store("no such folder".to_string()));
        let (logger, lines) = capture();

        let err = Stash::init(Options {
            storage: Some(Arc::new(store)),
            logger: Some(logger),
            ..Default::default()
        })
        .await
        .unwrap_err();

        assert_eq!(err, StashError::Init("no such folder".to_string()));
        assert_eq!(lines.lock().unwrap().last().unwrap(), "stash *CANNOT* initialize: no such folder");
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_invalid_save_period() {
        let (logger, lines) = capture();
        let stash = Stash::init(Options {
            save_period: Some(0),
            storage: Some(Arc::new(TestStore::returning(json!({})))),
            logger: Some(logger),
            ..Default::default()
        })
        .await
        .unwrap();

        assert_eq!(stash.save_period(), Duration::from_secs(30));
        let lines = lines.lock().unwrap();
        assert_eq!(
            lines[..3],
            [
                "stash logger was updated".to_string(),
                "stash save_period should be >=1 seconds, will use default [30]".to_string(),
                "stash storage was updated".to_string(),
            ]
        );
        assert!(lines[3].starts_with("stash was initialized, "));
        assert_eq!(lines.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_oversized_save_period() {
        let (logger, lines) = capture();
        let store = Arc::new(TestStore::returning(json!({})));
        let stash = Stash::init(Options {
            save_period: Some(i64::MAX),
            storage: Some(store.clone()),
            logger: Some(logger),
            ..Default::default()
        })
        .await
        .unwrap();

        assert_eq!(stash.save_period(), Duration::from_secs(30));
        assert_eq!(lines.lock().unwrap()[1], format!("stash save_period should be <={MAX_SAVE_PERIOD} seconds, will use default [30]"));

        stash.set("x", json!({"a": 1}), SetOptions::default());
        pass_time(31).await;
        assert_eq!(store.saves(), vec![("x".to_string(), json!({"a": 1}))]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_before_access() {
        let stash = init_with(Arc::new(TestStore::returning(json!({})))).await;
        assert_eq!(stash.get_status("x"), EntryStatus::uninitialized());
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_non_object_load() {
        let stash = init_with(Arc::new(TestStore::returning(json!(42)))).await;

        let x = stash.get("x", GetOptions::default()).await;

        assert_eq!(x.value(), Some(json!({})));
        assert_eq!(
            stash.get_status("x"),
            EntryStatus {
                load_error: Some(StashError::Load("not an object".to_string())),
                ..Default::default()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_load_failure() {
        let stash = init_with(Arc::new(TestStore::new(|_| Err(StashError::Load("boom!".to_string()))))).await;

        let x = stash.get("x", GetOptions::default()).await;
        let status = stash.get_status("x");

        assert_eq!(x.value(), Some(json!({})));
        assert!(!status.changed);
        assert_eq!(status.load_error, Some(StashError::Load("boom!".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_loads_once_and_never_saves_clean_data() {
        let store = Arc::new(TestStore::returning(json!({"a": 1})));
        let stash = init_with(store.clone()).await;

        let x = stash.get("x", GetOptions::default()).await;
        stash.get("x", GetOptions::default()).await;

        assert_eq!(x.value(), Some(json!({"a": 1})));
        assert_eq!(stash.get_status("x"), EntryStatus::default());
        assert_eq!(store.connects.load(Ordering::SeqCst), 1);
        assert_eq!(store.loads(), vec!["x".to_string()]);

        pass_time(31).await;
        assert!(store.saves().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_name_is_normalized() {
        let store = Arc::new(TestStore::returning(json!({"a": 1})));
        let stash = init_with(store.clone()).await;

        stash.get(5, GetOptions::default()).await;
        stash.get("5", GetOptions::default()).await;

        assert_eq!(store.loads(), vec!["5".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_then_get_does_not_load() {
        let store = Arc::new(TestStore::returning(json!({"a": 1})));
        let stash = init_with(store.clone()).await;

        stash.set("x", json!({"b": "b"}), SetOptions::default());
        let x = stash.get("x", GetOptions::default()).await;

        assert_eq!(x.value(), Some(json!({"b": "b"})));
        assert!(store.loads().is_empty());
        assert!(store.saves().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_is_saved_once() {
        let store = Arc::new(TestStore::returning(json!({"a": 1})));
        let stash = init_with(store.clone()).await;

        stash.set("x", json!({"b": "b"}), SetOptions::default());
        assert_eq!(
            stash.get_status("x"),
            EntryStatus {
                changed: true,
                ..Default::default()
            }
        );
        assert!(store.saves().is_empty());

        pass_time(31).await;
        assert_eq!(store.saves(), vec![("x".to_string(), json!({"b": "b"}))]);
        assert_eq!(stash.get_status("x"), EntryStatus::default());

        pass_time(30).await;
        assert_eq!(store.saves().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutation_is_saved() {
        let store = Arc::new(TestStore::returning(json!({"a": 1, "b": 2})));
        let stash = init_with(store.clone()).await;

        let x = stash.get("x", GetOptions::default()).await;
        x.set("a", 2);
        x.set("c", 3);
        x.remove("b");
        assert!(stash.get_status("x").changed);
        assert!(store.saves().is_empty());

        pass_time(31).await;
        assert_eq!(store.saves(), vec![("x".to_string(), json!({"a": 2, "c": 3}))]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deep_mutation_is_saved() {
        let store = Arc::new(TestStore::returning(json!({"a": {"b": {"c": {"d": 1}}}})));
        let stash = init_with(store.clone()).await;

        let x = stash.get("x", GetOptions::default()).await;
        let c = ["a", "b", "c"].into_iter().fold(x, |view, key| view.get(key).and_then(Field::into_nested).unwrap());
        c.set("d", 2);

        pass_time(31).await;
        assert_eq!(store.saves(), vec![("x".to_string(), json!({"a": {"b": {"c": {"d": 2}}}}))]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_readonly_get() {
        let store = Arc::new(TestStore::returning(json!({"a": 1, "b": 2})));
        let stash = init_with(store.clone()).await;

        let x = stash.get("x", GetOptions::readonly()).await;
        x.set("a", 2);
        x.set("c", 3);
        x.remove("b");

        assert_eq!(x.get_value("a"), Some(json!(1)));
        assert_eq!(x.get_value("b"), Some(json!(2)));
        assert_eq!(x.get_value("c"), None);
        assert_eq!(
            stash.get_status("x"),
            EntryStatus {
                readonly: true,
                ..Default::default()
            }
        );

        // later calls cannot lift readonly
        let again = stash.get("x", GetOptions { readonly: Some(false), default: None }).await;
        assert!(again.is_readonly());

        pass_time(31).await;
        assert!(store.saves().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_after_readonly_get() {
        let store = Arc::new(TestStore::returning(json!({"a": 1, "b": 2})));
        let stash = init_with(store.clone()).await;

        stash.get("x", GetOptions::readonly()).await;
        let x = stash.set("x", json!({"c": 3}), SetOptions::default());

        assert!(x.is_readonly());
        assert_eq!(x.value(), Some(json!({"a": 1, "b": 2})));
        assert_eq!(
            stash.get_status("x"),
            EntryStatus {
                readonly: true,
                ..Default::default()
            }
        );

        pass_time(31).await;
        assert!(store.saves().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_readonly_set() {
        let store = Arc::new(TestStore::returning(json!({})));
        let stash = init_with(store.clone()).await;

        let x = stash.set("x", json!({"a": 1, "b": 2}), SetOptions::readonly());
        x.set("a", 2);
        x.remove("b");

        assert_eq!(x.value(), Some(json!({"a": 1, "b": 2})));
        assert!(!stash.get_status("x").changed);

        pass_time(31).await;
        assert!(store.saves().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_process_wide_readonly() {
        let store = Arc::new(TestStore::returning(json!({"a": 1})));
        let stash = Stash::init(Options {
            storage: Some(store.clone()),
            readonly: true,
            ..Default::default()
        })
        .await
        .unwrap();

        let x = stash.get("x", GetOptions::default()).await;
        let y = stash.set("y", json!({"b": 1}), SetOptions::default());
        let z = stash.set("z", json!({"c": 1}), SetOptions { readonly: Some(false) });

        assert!(x.is_readonly());
        assert!(y.is_readonly());
        assert!(!z.is_readonly());

        pass_time(31).await;
        assert_eq!(store.saves(), vec![("z".to_string(), json!({"c": 1}))]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_error_entry_is_never_saved() {
        let (logger, lines) = capture();
        let store = Arc::new(TestStore::new(|_| Err(StashError::Load("corrupt".to_string()))));
        let stash = Stash::init(Options {
            storage: Some(store.clone()),
            logger: Some(logger),
            ..Default::default()
        })
        .await
        .unwrap();

        let x = stash.get("x", GetOptions::default()).await;
        x.set("a", 1);

        pass_time(61).await;
        assert!(store.saves().is_empty());
        assert!(lines.lock().unwrap().contains(&"stash [data:x] *NOT* saved (failed to load)".to_string()));

        // a full replacement makes the entry consistent again
        stash.set("x", json!({"b": 1}), SetOptions::default());
        assert_eq!(stash.get_status("x").load_error, None);

        pass_time(30).await;
        assert_eq!(store.saves(), vec![("x".to_string(), json!({"b": 1}))]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_value_is_seeded() {
        let store = Arc::new(TestStore::new(|_| Err(StashError::Load("missing".to_string()))));
        let stash = init_with(store.clone()).await;

        let x = stash.get("x", GetOptions::default().with_default(json!({"n": 0}))).await;

        assert_eq!(x.value(), Some(json!({"n": 0})));
        assert_eq!(
            stash.get_status("x"),
            EntryStatus {
                changed: true,
                ..Default::default()
            }
        );

        pass_time(31).await;
        assert_eq!(store.saves(), vec![("x".to_string(), json!({"n": 0}))]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_save_is_retried() {
        let store = Arc::new(TestStore::returning(json!({})));
        store.fail_saves.store(true, Ordering::SeqCst);
        let stash = init_with(store.clone()).await;

        stash.set("x", json!({"a": 1}), SetOptions::default());
        pass_time(31).await;

        let status = stash.get_status("x");
        assert!(status.changed);
        assert_eq!(status.save_error, Some(StashError::Save("disk full".to_string())));

        store.fail_saves.store(false, Ordering::SeqCst);
        pass_time(30).await;

        assert_eq!(store.saves(), vec![("x".to_string(), json!({"a": 1}))]);
        assert_eq!(stash.get_status("x"), EntryStatus::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_save_per_name_at_a_time() {
        let (logger, lines) = capture();
        let mut store = TestStore::returning(json!({}));
        store.save_delays.insert("x".to_string(), Duration::from_secs(45));
        let store = Arc::new(store);
        let stash = Stash::init(Options {
            storage: Some(store.clone()),
            logger: Some(logger),
            ..Default::default()
        })
        .await
        .unwrap();

        let x = stash.set("x", json!({"v": 1}), SetOptions::default());

        // first save starts at 30s and ends at 75s
        pass_time(40).await;
        assert_eq!(stash.saves_in_flight(), 1);
        x.set("v", 2);

        // the pass at 60s finds x dirty but still saving
        pass_time(25).await;
        assert!(lines.lock().unwrap().contains(&"stash [data:x] *NOT* saved (too busy)".to_string()));
        assert!(store.saves().is_empty());

        // 75s: first save lands; 90s: second save starts, ends at 135s
        pass_time(75).await;
        assert_eq!(store.saves(), vec![("x".to_string(), json!({"v": 1})), ("x".to_string(), json!({"v": 2}))]);
        assert_eq!(store.max_running.load(Ordering::SeqCst), 1);
        assert_eq!(stash.get_status("x"), EntryStatus::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_save_stalls_only_its_entry() {
        let mut store = TestStore::returning(json!({}));
        store.save_delays.insert("x".to_string(), Duration::from_secs(45));
        store.save_delays.insert("y".to_string(), Duration::from_secs(1));
        let store = Arc::new(store);
        let stash = init_with(store.clone()).await;

        stash.set("x", json!({"v": "x"}), SetOptions::default());
        stash.set("y", json!({"v": "y"}), SetOptions::default());

        // both saves start at 30s; y lands at 31s while x runs until 75s
        pass_time(32).await;
        assert_eq!(store.saves(), vec![("y".to_string(), json!({"v": "y"}))]);
        assert_eq!(stash.saves_in_flight(), 1);
        assert_eq!(store.max_running.load(Ordering::SeqCst), 2);

        pass_time(45).await;
        assert_eq!(store.saves().len(), 2);
        assert_eq!(stash.saves_in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deinit_stops_timer() {
        let (logger, lines) = capture();
        let store = Arc::new(TestStore::returning(json!({})));
        let stash = Stash::init(Options {
            storage: Some(store.clone()),
            logger: Some(logger),
            ..Default::default()
        })
        .await
        .unwrap();

        stash.set("x", json!({"a": 1}), SetOptions::default());
        stash.deinit();
        stash.deinit();

        assert!(!stash.is_running());
        assert_eq!(stash.get_status("x"), EntryStatus::uninitialized());
        assert_eq!(lines.lock().unwrap().iter().filter(|l| *l == "stash was deinitialized").count(), 1);

        pass_time(61).await;
        assert!(store.saves().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reinit_is_independent() {
        let store = Arc::new(TestStore::returning(json!({})));
        let first = init_with(store.clone()).await;
        first.set("x", json!({"a": 1}), SetOptions::default());
        first.deinit();

        let second = init_with(store.clone()).await;
        second.set("y", json!({"b": 1}), SetOptions::default());

        pass_time(31).await;
        assert_eq!(store.saves(), vec![("y".to_string(), json!({"b": 1}))]);
        assert_eq!(store.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_flush_with_mem_store() {
        let store = Arc::new(MemStore::with_items([("x", json!({"a": 1}))]));
        let stash = Stash::init(Options {
            storage: Some(store.clone()),
            ..Default::default()
        })
        .await
        .unwrap();

        let x = stash.get("x", GetOptions::default()).await;
        let _ = x.get("a");
        assert!(stash.flush().await.is_empty());

        x.set("a", json!([1, 2]));
        x.get("a").and_then(Field::into_nested).unwrap().push(3);
        let ro = stash.set("ro", json!({}), SetOptions::readonly());
        ro.set("k", 1);

        assert_eq!(stash.flush().await, vec![("x".to_string(), SaveOutcome::Saved)]);
        assert_eq!(store.get("x"), Some(json!({"a": [1, 2, 3]})));
        assert_eq!(store.get("ro"), None);
    }
}
