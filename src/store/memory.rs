//! In-memory reference [`FlowStore`], a `HashMap` guarded by a lock
//! instead of `&mut self`, since `FlowStore` is shared across
//! concurrently-running flows via `Arc`.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Checkpoint, FlowStore};
use crate::error::FlowError;

#[derive(Debug, Default)]
pub struct InMemoryFlowStore {
    checkpoints: Mutex<HashMap<String, Checkpoint>>,
}

impl InMemoryFlowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FlowStore for InMemoryFlowStore {
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), FlowError> {
        let mut checkpoints = self.checkpoints.lock().await;
        checkpoints.insert(checkpoint.flow_id.clone(), checkpoint);
        Ok(())
    }

    async fn load(&self, flow_id: &str) -> Result<Option<Checkpoint>, FlowError> {
        let checkpoints = self.checkpoints.lock().await;
        Ok(checkpoints.get(flow_id).cloned())
    }

    async fn delete(&self, flow_id: &str) -> Result<(), FlowError> {
        let mut checkpoints = self.checkpoints.lock().await;
        checkpoints.remove(flow_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, FlowError> {
        let checkpoints = self.checkpoints.lock().await;
        Ok(checkpoints.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkpoint(flow_id: &str) -> Checkpoint {
        Checkpoint {
            flow_id: flow_id.to_string(),
            cursor: vec![0],
            steps_completed: 0,
            state_json: serde_json::json!({}),
            compensation_stack: Vec::new(),
            schema_version: super::super::CHECKPOINT_SCHEMA_VERSION,
        }
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let store = InMemoryFlowStore::new();
        store.save(checkpoint("run-1")).await.unwrap();
        let loaded = store.load("run-1").await.unwrap();
        assert_eq!(loaded.unwrap().flow_id, "run-1");
    }

    #[tokio::test]
    async fn delete_removes_checkpoint() {
        let store = InMemoryFlowStore::new();
        store.save(checkpoint("run-1")).await.unwrap();
        store.delete("run-1").await.unwrap();
        assert!(store.load("run-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_reports_all_flow_ids() {
        let store = InMemoryFlowStore::new();
        store.save(checkpoint("run-1")).await.unwrap();
        store.save(checkpoint("run-2")).await.unwrap();
        let mut ids = store.list().await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["run-1".to_string(), "run-2".to_string()]);
    }
}
