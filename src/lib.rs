//! # sagaflow
//!
//! A durable saga-workflow engine. A [`Flow`] is a declarative tree of
//! steps, mutations, and control flow (`If`/`While`/`Repeat`/`ForEach`)
//! built once with [`FlowBuilder`] and run many times against different
//! state values by an [`Executor`].
//!
//! - **Step**: an async unit of work that can optionally register a
//!   compensation, run in reverse order if a later step fails.
//! - **Compensation**: LIFO rollback triggered by the first failure
//!   anywhere in the flow, including inside nested control flow.
//! - **Checkpointing**: the executor persists a [`Checkpoint`] after
//!   every successful step via a pluggable [`FlowStore`], so a crashed
//!   run can [`Executor::resume`] instead of restarting.
//!
//! ## Quick start
//!
//! ```rust
//! use sagaflow::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Order {
//!     id: String,
//!     paid: bool,
//! }
//!
//! impl FlowState for Order {
//!     fn flow_id(&self) -> &str {
//!         &self.id
//!     }
//! }
//!
//! # async fn run() -> Result<(), FlowError> {
//! let flow = FlowBuilder::<Order>::new("charge-order")
//!     .step("charge", |order: &mut Order, _cancel| {
//!         Box::pin(async move {
//!             order.paid = true;
//!             Ok(true)
//!         })
//!     })
//!     .with_compensation(|order: &mut Order, _cancel| {
//!         Box::pin(async move {
//!             order.paid = false;
//!             Ok(())
//!         })
//!     })
//!     .build()?;
//!
//! let executor = Executor::new(None);
//! let result = executor
//!     .execute(&flow, Order { id: "order-1".into(), paid: false }, CancellationToken::new())
//!     .await;
//! assert!(result.is_success);
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod cancel;
pub mod error;
pub mod executor;
pub mod ir;
pub mod resilience;
pub mod result;
pub mod state;
pub mod store;

pub use builder::{FlowBuilder, FlowConfigurable};
pub use cancel::CancellationToken;
pub use error::{FlowError, Result as FlowErrorResult};
pub use executor::{Executor, ExecutorConfig};
pub use ir::{Flow, ForEachPolicy};
pub use resilience::{NoRetryPipeline, ResiliencePipeline, RetryPipeline};
pub use result::{FlowResult, StepOutcome, StepRecord};
pub use state::FlowState;
pub use store::{Checkpoint, FlowStore};

#[cfg(feature = "store-file")]
pub use store::FileFlowStore;
#[cfg(feature = "store-memory")]
pub use store::InMemoryFlowStore;

/// Commonly used types, for `use sagaflow::prelude::*;`.
pub mod prelude {
    pub use crate::{
        CancellationToken, Executor, ExecutorConfig, Flow, FlowBuilder, FlowConfigurable,
        FlowError, FlowResult, FlowState, FlowStore, ForEachPolicy, StepOutcome, StepRecord,
    };
}
