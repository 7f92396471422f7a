use sagaflow::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Serialize, Deserialize, Debug)]
struct Run {
    id: String,
    log: Vec<String>,
}

impl FlowState for Run {
    fn flow_id(&self) -> &str {
        &self.id
    }
}

#[tokio::test]
async fn steps_run_in_declared_order() {
    let flow = FlowBuilder::<Run>::new("sequence")
        .step("a", |run: &mut Run, _cancel| {
            Box::pin(async move {
                run.log.push("a".into());
                Ok(true)
            })
        })
        .step("b", |run: &mut Run, _cancel| {
            Box::pin(async move {
                run.log.push("b".into());
                Ok(true)
            })
        })
        .step("c", |run: &mut Run, _cancel| {
            Box::pin(async move {
                run.log.push("c".into());
                Ok(true)
            })
        })
        .build()
        .unwrap();

    let executor = Executor::<Run>::new(None);
    let result = executor
        .execute(&flow, Run { id: "run-1".into(), log: Vec::new() }, CancellationToken::new())
        .await;

    assert!(result.is_success);
    assert_eq!(result.state.log, vec!["a", "b", "c"]);
    assert_eq!(result.trace.len(), 3);
}

#[tokio::test]
async fn ok_false_stops_without_running_downstream_steps() {
    let ran_c = Arc::new(AtomicUsize::new(0));
    let ran_c2 = ran_c.clone();

    let flow = FlowBuilder::<Run>::new("stop-on-false")
        .step("a", |run: &mut Run, _cancel| {
            Box::pin(async move {
                run.log.push("a".into());
                Ok(true)
            })
        })
        .step("b", |_run: &mut Run, _cancel| Box::pin(async move { Ok(false) }))
        .step("c", move |_run: &mut Run, _cancel| {
            ran_c2.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Ok(true) })
        })
        .build()
        .unwrap();

    let executor = Executor::<Run>::new(None);
    let result = executor
        .execute(&flow, Run { id: "run-2".into(), log: Vec::new() }, CancellationToken::new())
        .await;

    assert!(!result.is_success);
    assert!(matches!(result.error, Some(FlowError::StepStopped(ref name)) if name == "b"));
    assert_eq!(ran_c.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn a_throwing_step_fails_the_flow() {
    let flow = FlowBuilder::<Run>::new("stop-on-throw")
        .step("a", |run: &mut Run, _cancel| {
            Box::pin(async move {
                run.log.push("a".into());
                Ok(true)
            })
        })
        .step("b", |_run: &mut Run, _cancel| Box::pin(async move { anyhow::bail!("boom") }))
        .build()
        .unwrap();

    let executor = Executor::<Run>::new(None);
    let result = executor
        .execute(&flow, Run { id: "run-3".into(), log: Vec::new() }, CancellationToken::new())
        .await;

    assert!(!result.is_success);
    assert!(matches!(result.error, Some(FlowError::StepFailure { ref step_name, .. }) if step_name == "b"));
}
