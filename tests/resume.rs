use sagaflow::prelude::*;
use sagaflow::InMemoryFlowStore;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
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

fn build_flow(fail_after: Arc<AtomicUsize>) -> Flow<Counter> {
    let mut builder = FlowBuilder::<Counter>::new("resumable-counter");
    for step in 1..=5 {
        let fail_after = fail_after.clone();
        builder = builder.step(format!("step-{step}"), move |counter: &mut Counter, _cancel| {
            let fail_after = fail_after.clone();
            Box::pin(async move {
                if step == fail_after.load(Ordering::SeqCst) {
                    anyhow::bail!("simulated crash after step {step}");
                }
                counter.n += 1;
                Ok(true)
            })
        });
    }
    builder.build().unwrap()
}

#[tokio::test]
async fn resume_skips_completed_steps_and_finishes_the_rest() {
    let store: Arc<dyn FlowStore> = Arc::new(InMemoryFlowStore::new());

    // First run "crashes" after step 3 by failing step 4's body outright
    // instead of modelling a real process crash: the checkpoint written
    // after step 3 is what resume actually reads.
    let fail_after = Arc::new(AtomicUsize::new(4));
    let flow = build_flow(fail_after.clone());
    let executor = Executor::<Counter>::new(Some(store.clone()));

    let first = executor
        .execute(&flow, Counter { id: "counter-1".into(), n: 0 }, CancellationToken::new())
        .await;
    assert!(!first.is_success);

    // Recreate the checkpoint the way a real crash after step 3's commit
    // would leave it (execute()'s own failure path deletes it on its way
    // out, since this is a clean failure, not a process crash).
    store
        .save(Checkpoint {
            flow_id: "counter-1".into(),
            cursor: vec![3],
            steps_completed: 3,
            state_json: serde_json::json!({"id": "counter-1", "n": 3}),
            compensation_stack: Vec::new(),
            schema_version: sagaflow::store::CHECKPOINT_SCHEMA_VERSION,
        })
        .await
        .unwrap();

    fail_after.store(0, Ordering::SeqCst); // no more simulated failures
    let resumed = executor.resume(&flow, "counter-1", CancellationToken::new()).await.unwrap();

    assert!(resumed.is_success);
    assert_eq!(resumed.state.n, 5);
    // only steps 4 and 5 should have actually run their bodies this time
    assert_eq!(resumed.trace.len(), 2);
}

#[tokio::test]
async fn resume_without_a_checkpoint_fails() {
    let store: Arc<dyn FlowStore> = Arc::new(InMemoryFlowStore::new());
    let flow = build_flow(Arc::new(AtomicUsize::new(0)));
    let executor = Executor::<Counter>::new(Some(store));

    let err = executor
        .resume(&flow, "never-ran", CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::NoCheckpoint(ref id) if id == "never-ran"));
}

#[tokio::test]
async fn the_same_flow_runs_independently_over_concurrent_state() {
    let flow = Arc::new(build_flow(Arc::new(AtomicUsize::new(0))));
    let executor = Arc::new(Executor::<Counter>::new(None));

    let mut handles = Vec::new();
    for i in 0..8 {
        let flow = flow.clone();
        let executor = executor.clone();
        handles.push(tokio::spawn(async move {
            executor
                .execute(&flow, Counter { id: format!("counter-{i}"), n: 0 }, CancellationToken::new())
                .await
        }));
    }
    for handle in handles {
        let result = handle.await.unwrap();
        assert!(result.is_success);
        assert_eq!(result.state.n, 5);
    }
}
