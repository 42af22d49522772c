use std::sync::Arc;

use crate::{
    Config, FileStore, MemStore, Options, Result, Stash, StoreType,
    config::DEFAULT_DATA_FOLDER,
    diag::Logger,
    store::Storage,
};

#[derive(Default)]
pub struct StashBuilder {
    save_period: Option<i64>,
    storage: Option<Arc<dyn Storage>>,
    readonly: bool,
    logger: Option<Logger>,
}

impl StashBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes period, readonly flag and backend from `config`.
    pub fn config(
        mut self,
        config: &Config,
    ) -> Self {
        self.save_period = Some(config.save_period);
        self.readonly = config.readonly;
        self.storage = Some(match config.store.store_type {
            StoreType::Mem => Arc::new(MemStore::new()),
            StoreType::File => {
                let folder = config.store.file.as_ref().map_or(DEFAULT_DATA_FOLDER, |f| f.data_folder.as_str());
                Arc::new(FileStore::new(folder))
            }
        });
        self
    }

    pub fn save_period(
        mut self,
        secs: i64,
    ) -> Self {
        self.save_period = Some(secs);
        self
    }

    pub fn storage(
        mut self,
        storage: Arc<dyn Storage>,
    ) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn readonly(
        mut self,
        readonly: bool,
    ) -> Self {
        self.readonly = readonly;
        self
    }

    pub fn logger(
        mut self,
        logger: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        self.logger = Some(Arc::new(logger));
        self
    }

    pub fn options(self) -> Options {
        Options {
            save_period: self.save_period,
            storage: self.storage,
            readonly: self.readonly,
            logger: self.logger,
        }
    }

    pub async fn build(self) -> Result<Stash> {
        Stash::init(self.options()).await
    }
}
