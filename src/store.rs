//! Durable checkpoint storage.
//!
//! A small async trait with `save`/`load`/`delete`, implemented by an
//! in-memory reference backend and a JSON-file-per-key backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FlowError;

#[cfg(feature = "store-file")]
pub mod file;
#[cfg(feature = "store-memory")]
pub mod memory;

#[cfg(feature = "store-file")]
pub use file::FileFlowStore;
#[cfg(feature = "store-memory")]
pub use memory::InMemoryFlowStore;

/// Bumped whenever `Checkpoint`'s on-disk shape changes in a
/// backward-incompatible way.
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

/// A compensation stack entry as persisted, just enough to look the
/// live compensation closure back up in the IR on resume (see
/// [`crate::ir::find_compensation`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompensationRef {
    pub step_name: String,
}

/// The durable snapshot written after each successful step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub flow_id: String,
    /// Ordinal path of the step that was about to run when this
    /// checkpoint was written, kept for observability/debugging.
    pub cursor: Vec<usize>,
    /// How many `Step` nodes have completed successfully so far. This,
    /// not `cursor`, drives resume's skip logic, see
    /// `executor::run_nodes`'s doc comment for why.
    pub steps_completed: usize,
    pub state_json: serde_json::Value,
    pub compensation_stack: Vec<CompensationRef>,
    pub schema_version: u32,
}

/// Pluggable persistence for in-flight flow state.
///
/// Implementations must treat `flow_id` as an opaque key; they are not
/// expected to interpret or index its structure.
#[async_trait]
pub trait FlowStore: Send + Sync {
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), FlowError>;
    async fn load(&self, flow_id: &str) -> Result<Option<Checkpoint>, FlowError>;
    async fn delete(&self, flow_id: &str) -> Result<(), FlowError>;
    async fn list(&self) -> Result<Vec<String>, FlowError>;
}
