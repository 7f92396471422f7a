//! Pluggable retry behaviour around a step body.
//!
//! A bounded attempt loop with a fixed delay between attempts. The
//! default pipeline runs a step body exactly once; `RetryPipeline` is an
//! opt-in addition for steps whose failures are worth retrying before
//! they reach compensation.

use std::time::Duration;

use async_trait::async_trait;

use crate::cancel::CancellationToken;
use crate::ir::StepBodyFn;

/// Wraps every step body's invocation. Implementations decide whether,
/// and how many times, to retry a failing call before giving up.
#[async_trait]
pub trait ResiliencePipeline<S>: Send + Sync {
    async fn run(
        &self,
        body: &StepBodyFn<S>,
        state: &mut S,
        cancel: &CancellationToken,
    ) -> anyhow::Result<bool>;
}

/// Runs the body exactly once. The default for `Executor::new`.
#[derive(Debug, Default)]
pub struct NoRetryPipeline;

#[async_trait]
impl<S: Send + 'static> ResiliencePipeline<S> for NoRetryPipeline {
    async fn run(
        &self,
        body: &StepBodyFn<S>,
        state: &mut S,
        cancel: &CancellationToken,
    ) -> anyhow::Result<bool> {
        body(state, cancel).await
    }
}

/// Retries a failing body up to `max_attempts` times, sleeping `delay`
/// between attempts. Stops early if the token is cancelled.
#[derive(Debug, Clone)]
pub struct RetryPipeline {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPipeline {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), delay }
    }
}

#[async_trait]
impl<S: Send + 'static> ResiliencePipeline<S> for RetryPipeline {
    async fn run(
        &self,
        body: &StepBodyFn<S>,
        state: &mut S,
        cancel: &CancellationToken,
    ) -> anyhow::Result<bool> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match body(state, cancel).await {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.max_attempts && !cancel.is_cancelled() => {
                    tracing::debug!(attempt, max = self.max_attempts, error = %e, "step attempt failed, retrying");
                    tokio::time::sleep(self.delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn retry_pipeline_retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let body = move |_state: &mut (), _cancel: &CancellationToken| {
            let calls = calls2.clone();
            Box::pin(async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    anyhow::bail!("not yet");
                }
                Ok(true)
            }) as futures::future::BoxFuture<'_, anyhow::Result<bool>>
        };
        let pipeline = RetryPipeline::new(5, Duration::from_millis(1));
        let mut state = ();
        let cancel = CancellationToken::new();
        let result = pipeline.run(&body, &mut state, &cancel).await;
        assert!(result.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
