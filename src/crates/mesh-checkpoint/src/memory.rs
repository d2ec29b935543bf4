//! In-memory [`Checkpointer`] for development, tests, and single-process
//! deployments where losing checkpoints on restart is acceptable.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::traits::Checkpointer;

type Storage = Arc<RwLock<HashMap<String, Value>>>;

/// Thread-safe, process-local checkpoint store backed by a `HashMap`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointer {
    storage: Storage,
}

impl InMemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of runs currently holding a saved checkpoint.
    pub async fn len(&self) -> usize {
        self.storage.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every stored checkpoint. Test isolation helper.
    pub async fn clear(&self) {
        self.storage.write().await.clear();
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn save(&self, run_id: &str, checkpoint: Value) -> Result<()> {
        self.storage.write().await.insert(run_id.to_string(), checkpoint);
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<Option<Value>> {
        Ok(self.storage.read().await.get(run_id).cloned())
    }

    async fn delete(&self, run_id: &str) -> Result<()> {
        self.storage.write().await.remove(run_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = InMemoryCheckpointer::new();
        store.save("run-1", json!({"step": 1})).await.unwrap();

        let loaded = store.load("run-1").await.unwrap();
        assert_eq!(loaded, Some(json!({"step": 1})));
    }

    #[tokio::test]
    async fn load_missing_run_returns_none() {
        let store = InMemoryCheckpointer::new();
        assert_eq!(store.load("never-saved").await.unwrap(), None);
    }

    #[tokio::test]
    async fn save_replaces_prior_checkpoint_for_same_run() {
        let store = InMemoryCheckpointer::new();
        store.save("run-1", json!({"step": 1})).await.unwrap();
        store.save("run-1", json!({"step": 2})).await.unwrap();

        assert_eq!(store.load("run-1").await.unwrap(), Some(json!({"step": 2})));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn delete_removes_the_checkpoint() {
        let store = InMemoryCheckpointer::new();
        store.save("run-1", json!({"step": 1})).await.unwrap();

        store.delete("run-1").await.unwrap();

        assert_eq!(store.load("run-1").await.unwrap(), None);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn delete_of_unknown_run_is_a_noop() {
        let store = InMemoryCheckpointer::new();
        store.delete("never-saved").await.unwrap();
    }

    #[tokio::test]
    async fn runs_are_isolated_from_each_other() {
        let store = InMemoryCheckpointer::new();
        store.save("run-a", json!({"who": "a"})).await.unwrap();
        store.save("run-b", json!({"who": "b"})).await.unwrap();

        assert_eq!(store.len().await, 2);
        store.delete("run-a").await.unwrap();
        assert_eq!(store.load("run-b").await.unwrap(), Some(json!({"who": "b"})));
    }
}
