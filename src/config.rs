use std::{fs, path::Path};

use serde::Deserialize;

use crate::Result;

/// Default flush period in seconds.
pub const DEFAULT_SAVE_PERIOD: u64 = 30;
/// One year, in seconds.
pub const MAX_SAVE_PERIOD: u64 = 365 * 24 * 60 * 60;
/// Default folder used by the file store.
pub const DEFAULT_DATA_FOLDER: &str = "./data/";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// store config
    pub store: StoreConfig,
    /// seconds between two save passes, must be >= 1, defaults to 30
    pub save_period: i64,
    /// make every entry readonly
    pub readonly: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// store type
    pub store_type: StoreType,
    /// file store config
    pub file: Option<FileConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    Mem,
    #[default]
    File,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    /// folder holding one `<name>.json` per entry
    pub data_folder: String,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            data_folder: DEFAULT_DATA_FOLDER.to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            save_period: DEFAULT_SAVE_PERIOD as i64,
            readonly: false,
        }
    }
}

impl Config {
    pub fn create<T: AsRef<Path>>(path: T) -> Result<Self> {
        let data = fs::read_to_string(path.as_ref())?;

        Self::load_from_str(data.as_str())
    }

    pub fn load_from_str(toml_str: &str) -> Result<Self> {
        let config = toml::from_str::<Config>(toml_str)?;
        Ok(config)
    }
}
