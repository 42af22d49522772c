use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::trace;

use crate::{
    Result, StashError,
    common::MemCache,
    store::{ConnectOptions, Storage},
};

/// Process-local backend; values live as long as the store.
#[derive(Clone)]
pub struct MemStore {
    items: Arc<MemCache<String, Value>>,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            items: Arc::new(MemCache::unbounded()),
        }
    }

    /// A store pre-populated with `items`.
    pub fn with_items<I, K>(items: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let store = Self::new();
        for (name, value) in items {
            store.items.set(name.into(), value);
        }
        store
    }

    /// Currently stored value for `name`.
    pub fn get(
        &self,
        name: &str,
    ) -> Option<Value> {
        self.items.get(&name.to_string())
    }

    pub fn contains(
        &self,
        name: &str,
    ) -> bool {
        self.items.contains(&name.to_string())
    }

    pub fn remove(
        &self,
        name: &str,
    ) {
        self.items.remove(&name.to_string());
    }
}

#[async_trait]
impl Storage for MemStore {
    async fn connect(
        &self,
        _options: &ConnectOptions,
    ) -> Result<()> {
        Ok(())
    }

    async fn load(
        &self,
        name: &str,
    ) -> Result<Value> {
        trace!("mem::load({name})");
        self.get(name).ok_or_else(|| StashError::Load(format!("{name} not found")))
    }

    async fn save(
        &self,
        name: &str,
        data: &Value,
    ) -> Result<()> {
        trace!("mem::save({name})");
        self.items.set(name.to_string(), data.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_load_save() {
        let store = MemStore::with_items([("a", json!({"x": 1}))]);
        store.connect(&ConnectOptions::default()).await.unwrap();

        assert_eq!(store.load("a").await.unwrap(), json!({"x": 1}));
        assert_eq!(store.load("b").await, Err(StashError::Load("b not found".to_string())));

        store.save("b", &json!([1, 2])).await.unwrap();
        assert_eq!(store.load("b").await.unwrap(), json!([1, 2]));

        store.remove("a");
        assert!(!store.contains("a"));
        assert!(store.contains("b"));
    }
}
