use sagaflow::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

#[derive(Serialize, Deserialize, Debug)]
struct Run {
    id: String,
}

impl FlowState for Run {
    fn flow_id(&self) -> &str {
        &self.id
    }
}

fn element_flow(entered: Arc<Mutex<Vec<char>>>, fail_at: char) -> impl Fn(char) -> Flow<Run> {
    move |item: char| {
        let entered = entered.clone();
        FlowBuilder::<Run>::new(format!("element-{item}"))
            .step("process", move |_run: &mut Run, _cancel| {
                let entered = entered.clone();
                Box::pin(async move {
                    entered.lock().unwrap().push(item);
                    if item == fail_at {
                        anyhow::bail!("failed at {item}");
                    }
                    Ok(true)
                })
            })
            .build()
            .unwrap()
    }
}

#[tokio::test]
async fn stop_on_first_failure_halts_before_later_elements() {
    let entered = Arc::new(Mutex::new(Vec::new()));
    let items = vec!['a', 'b', 'c', 'd', 'e'];
    let build_element = element_flow(entered.clone(), 'c');

    let flow = FlowBuilder::<Run>::new("foreach-stop")
        .foreach(
            move |_r: &Run| items.clone(),
            build_element,
            ForEachPolicy::StopOnFirstFailure,
        )
        .build()
        .unwrap();

    let executor = Executor::<Run>::new(None);
    let result = executor
        .execute(&flow, Run { id: "run-1".into() }, CancellationToken::new())
        .await;

    assert!(!result.is_success);
    assert_eq!(*entered.lock().unwrap(), vec!['a', 'b', 'c']);
}

#[tokio::test]
async fn continue_on_failure_enters_every_element_and_still_succeeds() {
    let entered = Arc::new(Mutex::new(Vec::new()));
    let items = vec!['a', 'b', 'c', 'd', 'e'];
    let build_element = element_flow(entered.clone(), 'c');

    let flow = FlowBuilder::<Run>::new("foreach-continue")
        .foreach(
            move |_r: &Run| items.clone(),
            build_element,
            ForEachPolicy::ContinueOnFailure,
        )
        .build()
        .unwrap();

    let executor = Executor::<Run>::new(None);
    let result = executor
        .execute(&flow, Run { id: "run-2".into() }, CancellationToken::new())
        .await;

    assert!(result.is_success);
    assert_eq!(*entered.lock().unwrap(), vec!['a', 'b', 'c', 'd', 'e']);
}
