use sagaflow::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug)]
struct Run {
    id: String,
    n: i64,
    log: Vec<String>,
}

impl FlowState for Run {
    fn flow_id(&self) -> &str {
        &self.id
    }
}

fn new_run(n: i64) -> Run {
    Run { id: format!("run-{n}"), n, log: Vec::new() }
}

#[tokio::test]
async fn if_elseif_else_picks_exactly_one_branch() {
    let flow = FlowBuilder::<Run>::new("branching")
        .if_(|r: &Run| r.n > 10)
        .step("big", |r: &mut Run, _c| {
            Box::pin(async move {
                r.log.push("big".into());
                Ok(true)
            })
        })
        .elseif(|r: &Run| r.n > 0)
        .step("small", |r: &mut Run, _c| {
            Box::pin(async move {
                r.log.push("small".into());
                Ok(true)
            })
        })
        .else_branch()
        .step("non-positive", |r: &mut Run, _c| {
            Box::pin(async move {
                r.log.push("non-positive".into());
                Ok(true)
            })
        })
        .end_if()
        .build()
        .unwrap();

    let executor = Executor::<Run>::new(None);

    let r = executor.execute(&flow, new_run(20), CancellationToken::new()).await;
    assert_eq!(r.state.log, vec!["big"]);

    let r = executor.execute(&flow, new_run(5), CancellationToken::new()).await;
    assert_eq!(r.state.log, vec!["small"]);

    let r = executor.execute(&flow, new_run(-1), CancellationToken::new()).await;
    assert_eq!(r.state.log, vec!["non-positive"]);
}

#[tokio::test]
async fn while_loop_runs_until_guard_goes_false() {
    let flow = FlowBuilder::<Run>::new("countdown")
        .while_(|r: &Run| r.n > 0)
        .step("decrement", |r: &mut Run, _c| {
            Box::pin(async move {
                r.n -= 1;
                Ok(true)
            })
        })
        .end_while()
        .build()
        .unwrap();

    let executor = Executor::<Run>::new(None);
    let result = executor.execute(&flow, new_run(5), CancellationToken::new()).await;

    assert!(result.is_success);
    assert_eq!(result.state.n, 0);
    assert_eq!(result.trace.len(), 5);
}

#[tokio::test]
async fn while_loop_exceeding_budget_fails_with_loop_budget_exceeded() {
    let flow = FlowBuilder::<Run>::new("runaway")
        .while_(|_r: &Run| true)
        .step("noop", |_r: &mut Run, _c| Box::pin(async move { Ok(true) }))
        .end_while()
        .build()
        .unwrap();

    let executor = Executor::<Run>::new(None).with_config(ExecutorConfig {
        max_loop_iterations: 10,
        checkpoint_on_every_step: false,
    });
    let result = executor.execute(&flow, new_run(1), CancellationToken::new()).await;

    assert!(!result.is_success);
    assert!(matches!(result.error, Some(FlowError::LoopBudgetExceeded(_))));
}

#[tokio::test]
async fn repeat_breaks_early_when_break_if_fires() {
    let flow = FlowBuilder::<Run>::new("repeat-break")
        .repeat(10)
        .step("increment", |r: &mut Run, _c| {
            Box::pin(async move {
                r.n += 1;
                Ok(true)
            })
        })
        .break_if(|r: &Run| r.n >= 3)
        .end_repeat()
        .build()
        .unwrap();

    let executor = Executor::<Run>::new(None);
    let result = executor.execute(&flow, new_run(0), CancellationToken::new()).await;

    assert!(result.is_success);
    assert_eq!(result.state.n, 3);
}
