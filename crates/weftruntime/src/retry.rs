use crate::step::{StepError, StepExecutor};
use chrono::Utc;
use serde_json::Value as Json;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use weftcore::{
    ExecutionContext, ExecutionEvent, HandlerOutput, NodeSpec, OnError, RetryPolicy, StepRecord,
};

/// Delay before the `retry`-th retry (1-based).
pub trait Backoff: Send + Sync {
    fn delay(&self, retry: u32) -> Duration;
}

/// Same delay before every retry
#[derive(Debug, Clone)]
pub struct FixedBackoff {
    delay: Duration,
}

impl FixedBackoff {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Backoff for FixedBackoff {
    fn delay(&self, _retry: u32) -> Duration {
        self.delay
    }
}

/// `initial * multiplier^(retry - 1)`, capped at `max`
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    multiplier: f64,
    max: Duration,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, multiplier: f64) -> Self {
        Self {
            initial,
            multiplier: multiplier.max(1.0),
            max: Duration::from_secs(60),
        }
    }

    pub fn with_max(mut self, max: Duration) -> Self {
        self.max = max;
        self
    }
}

impl Backoff for ExponentialBackoff {
    fn delay(&self, retry: u32) -> Duration {
        let factor = self.multiplier.powi(retry.saturating_sub(1) as i32);
        let millis = (self.initial.as_millis() as f64 * factor).min(self.max.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }
}

/// Backoff strategy for a node's retry policy.
pub fn backoff_for(policy: &RetryPolicy) -> Box<dyn Backoff> {
    let initial = Duration::from_millis(policy.retry_delay_ms);
    match policy.backoff_multiplier {
        Some(multiplier) if multiplier > 1.0 => Box::new(ExponentialBackoff::new(initial, multiplier)),
        _ => Box::new(FixedBackoff::new(initial)),
    }
}

/// What the scheduler does with a node after its policy has been applied.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Completed(HandlerOutput),
    /// Failed under `onError: continue`; `$steps` holds `null`.
    Continued { error: String },
    /// Failed for good; the run stops.
    Failed { error: String },
    Cancelled,
}

/// Wraps [`StepExecutor`] with the node's `onError` policy.
#[derive(Clone)]
pub struct ErrorManager {
    step: StepExecutor,
}

impl ErrorManager {
    pub fn new(step: StepExecutor) -> Self {
        Self { step }
    }

    pub async fn run(
        &self,
        node: &NodeSpec,
        input: &Json,
        ctx: &ExecutionContext,
        cancellation: &CancellationToken,
    ) -> StepOutcome {
        let events = self.step.events();
        let run_id = ctx.run_id();
        let backoff = match &node.on_error {
            OnError::Retry(policy) => Some((policy.max_retries, backoff_for(policy))),
            _ => None,
        };

        let mut attempt = 1;
        loop {
            let start = Instant::now();
            let err = match self
                .step
                .execute(node, input, ctx, cancellation, attempt)
                .await
            {
                Ok(output) => {
                    let duration_ms = start.elapsed().as_millis() as u64;
                    tracing::info!("Node {} completed in {}ms", node.name, duration_ms);
                    events.emit(ExecutionEvent::NodeCompleted {
                        run_id,
                        node: node.name.clone(),
                        branch: output.branch_or_default(),
                        duration_ms,
                        timestamp: Utc::now(),
                    });
                    return StepOutcome::Completed(output);
                }
                Err(err) => err,
            };

            if err.is_cancelled() {
                return StepOutcome::Cancelled;
            }

            if let Some((max_retries, backoff)) = &backoff {
                if !err.is_fatal() && err.is_retryable() && attempt <= *max_retries {
                    let delay = backoff.delay(attempt);
                    tracing::warn!(
                        "Node {} failed (attempt {}), retrying in {}ms: {}",
                        node.name,
                        attempt,
                        delay.as_millis(),
                        err
                    );
                    events.emit(ExecutionEvent::NodeRetrying {
                        run_id,
                        node: node.name.clone(),
                        attempt,
                        delay_ms: delay.as_millis() as u64,
                        error: err.to_string(),
                        timestamp: Utc::now(),
                    });
                    tokio::select! {
                        _ = cancellation.cancelled() => return StepOutcome::Cancelled,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                    continue;
                }
            }

            return self.fail(node, ctx, err);
        }
    }

    fn fail(&self, node: &NodeSpec, ctx: &ExecutionContext, err: StepError) -> StepOutcome {
        let error = err.to_string();
        self.step.events().emit(ExecutionEvent::NodeFailed {
            run_id: ctx.run_id(),
            node: node.name.clone(),
            error: error.clone(),
            timestamp: Utc::now(),
        });

        if node.on_error == OnError::Continue && !err.is_fatal() {
            tracing::warn!("Node {} failed, continuing: {}", node.name, error);
            if let Err(e) = ctx.steps().record(&node.name, StepRecord::main(Json::Null, 0)) {
                tracing::warn!("Could not record null output for {}: {}", node.name, e);
            }
            return StepOutcome::Continued { error };
        }

        tracing::error!("Node {} failed: {}", node.name, error);
        StepOutcome::Failed { error }
    }
}
