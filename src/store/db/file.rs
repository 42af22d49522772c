use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, ser::PrettyFormatter};
use tokio::fs;
use tracing::{info, warn};

use crate::{
    Result, StashError,
    config::DEFAULT_DATA_FOLDER,
    store::{ConnectOptions, Storage, map_db_err},
    utils,
};

/// Length of the random part of temp file names.
const TMP_ID_LEN: usize = 13;

/// Stores every entry as `<data_folder>/<name>.json`.
#[derive(Debug)]
pub struct FileStore {
    data_folder: PathBuf,
    readonly: AtomicBool,
}

impl Default for FileStore {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_FOLDER)
    }
}

impl FileStore {
    pub fn new(data_folder: impl Into<PathBuf>) -> Self {
        Self {
            data_folder: data_folder.into(),
            readonly: AtomicBool::new(false),
        }
    }

    /// Never create the folder nor write anything.
    pub fn readonly(
        self,
        readonly: bool,
    ) -> Self {
        self.readonly.store(readonly, Ordering::Relaxed);
        self
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly.load(Ordering::Relaxed)
    }

    pub fn data_folder(&self) -> &Path {
        &self.data_folder
    }

    pub fn file_path(
        &self,
        name: &str,
    ) -> Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(StashError::Store(format!("invalid entry name [{name}]")));
        }
        Ok(self.data_folder.join(format!("{name}.json")))
    }

    fn tmp_path(
        &self,
        prefix: &str,
    ) -> PathBuf {
        self.data_folder.join(format!("{prefix}.{}.json", utils::shortid(TMP_ID_LEN)))
    }
}

/// JSON with four space indentation.
fn to_pretty(data: &Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    data.serialize(&mut ser)?;
    Ok(buf)
}

#[async_trait]
impl Storage for FileStore {
    async fn connect(
        &self,
        options: &ConnectOptions,
    ) -> Result<()> {
        if options.readonly {
            self.readonly.store(true, Ordering::Relaxed);
        }
        let readonly = self.is_readonly();
        let folder = self.data_folder.display();

        if !fs::try_exists(&self.data_folder).await.map_err(map_db_err)? {
            if readonly {
                warn!("file store: data folder {folder} does not exist");
            } else {
                info!("file store: data folder {folder} does not exist, creating it");
                fs::create_dir_all(&self.data_folder).await.map_err(map_db_err)?;
            }
        } else {
            info!("file store: data folder {folder} ok");
        }

        if !readonly {
            let check = self.tmp_path("tmp");
            fs::write(&check, b"{}").await.map_err(map_db_err)?;
            fs::remove_file(&check).await.map_err(map_db_err)?;
            info!("file store: data folder {folder} write access ok");
        }
        Ok(())
    }

    async fn load(
        &self,
        name: &str,
    ) -> Result<Value> {
        let path = self.file_path(name)?;
        let text = fs::read_to_string(&path).await.map_err(|e| StashError::Load(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&text).map_err(|e| StashError::Load(format!("{}: {e}", path.display())))
    }

    async fn save(
        &self,
        name: &str,
        data: &Value,
    ) -> Result<()> {
        if self.is_readonly() {
            return Err(StashError::Save(format!("{name}: file store is readonly")));
        }
        let path = self.file_path(name)?;
        let text = to_pretty(data)?;

        // write aside, then rename over the target
        let tmp = self.tmp_path(&format!(".{name}"));
        if let Err(e) = fs::write(&tmp, &text).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(StashError::Save(format!("{}: {e}", tmp.display())));
        }
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(StashError::Save(format!("{}: {e}", path.display())));
        }
        Ok(())
    }
}
