//! JSON-file-per-flow [`FlowStore`], a read-modify-write-whole-file
//! strategy keyed by flow id, one file per key, so concurrent flows
//! don't contend on a single file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;

use super::{Checkpoint, FlowStore};
use crate::error::FlowError;

/// Persists each flow's checkpoint as `{root}/{flow_id}.json`.
///
/// A single [`tokio::sync::Mutex`] serializes all I/O against `root`;
/// this backend favours correctness over throughput.
#[derive(Debug)]
pub struct FileFlowStore {
    root: PathBuf,
    lock: Mutex<()>,
}

impl FileFlowStore {
    pub async fn new(root: impl AsRef<Path>) -> Result<Self, FlowError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| FlowError::Infrastructure(format!("creating store dir {root:?}: {e}")))?;
        Ok(Self { root, lock: Mutex::new(()) })
    }

    fn path_for(&self, flow_id: &str) -> PathBuf {
        self.root.join(format!("{flow_id}.json"))
    }
}

#[async_trait]
impl FlowStore for FileFlowStore {
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), FlowError> {
        let _guard = self.lock.lock().await;
        let path = self.path_for(&checkpoint.flow_id);
        let json = serde_json::to_vec_pretty(&checkpoint)
            .map_err(|e| FlowError::Infrastructure(format!("serializing checkpoint: {e}")))?;
        fs::write(&path, json)
            .await
            .map_err(|e| FlowError::Infrastructure(format!("writing {path:?}: {e}")))
    }

    async fn load(&self, flow_id: &str) -> Result<Option<Checkpoint>, FlowError> {
        let _guard = self.lock.lock().await;
        let path = self.path_for(flow_id);
        match fs::read(&path).await {
            Ok(bytes) => {
                let checkpoint = serde_json::from_slice(&bytes)
                    .map_err(|e| FlowError::Infrastructure(format!("reading {path:?}: {e}")))?;
                Ok(Some(checkpoint))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(FlowError::Infrastructure(format!("reading {path:?}: {e}"))),
        }
    }

    async fn delete(&self, flow_id: &str) -> Result<(), FlowError> {
        let _guard = self.lock.lock().await;
        let path = self.path_for(flow_id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FlowError::Infrastructure(format!("removing {path:?}: {e}"))),
        }
    }

    async fn list(&self) -> Result<Vec<String>, FlowError> {
        let _guard = self.lock.lock().await;
        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| FlowError::Infrastructure(format!("reading dir {:?}: {e}", self.root)))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| FlowError::Infrastructure(format!("listing {:?}: {e}", self.root)))?
        {
            if let Some(name) = entry.path().file_stem().and_then(|s| s.to_str()) {
                ids.push(name.to_string());
            }
        }
        Ok(ids)
    }
}
