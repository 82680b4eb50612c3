use crate::registry::OperationRegistry;
use chrono::Utc;
use serde_json::{Map, Value as Json};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use weftcore::expression::{resolve_value, Scope};
use weftcore::{
    ContextError, ErrorClass, EventBus, ExecutionContext, ExecutionEvent, ExpressionError,
    HandlerError, HandlerOutput, NodeSpec, Parameters, StepContext, StepRecord, WorkflowError,
};

/// Why a single step attempt failed.
#[derive(Error, Debug, Clone)]
pub enum StepError {
    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error("Cannot resolve parameter '{parameter}': {source}")]
    Resolve {
        parameter: String,
        source: ExpressionError,
    },

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Context(#[from] ContextError),
}

impl StepError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StepError::Handler(e) if e.is_retryable())
    }

    /// Failures that end the run whatever the node's `onError` says:
    /// missing handlers, context violations and data-integrity errors.
    pub fn is_fatal(&self) -> bool {
        match self {
            StepError::Workflow(_) | StepError::Context(_) => true,
            StepError::Handler(e) => e.class() == ErrorClass::DataIntegrity,
            StepError::Resolve { .. } => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, StepError::Handler(HandlerError::Cancelled))
    }
}

/// Drives one node through parameter resolution, handler dispatch and the
/// `$steps` write.
#[derive(Clone)]
pub struct StepExecutor {
    registry: Arc<OperationRegistry>,
    events: EventBus,
    step_timeout: Option<Duration>,
}

impl StepExecutor {
    pub fn new(registry: Arc<OperationRegistry>, events: EventBus) -> Self {
        Self {
            registry,
            events,
            step_timeout: None,
        }
    }

    pub fn with_timeout(mut self, step_timeout: Option<Duration>) -> Self {
        self.step_timeout = step_timeout;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Run one attempt of `node` with `input` as `$json`.
    pub async fn execute(
        &self,
        node: &NodeSpec,
        input: &Json,
        ctx: &ExecutionContext,
        cancellation: &CancellationToken,
        attempt: u32,
    ) -> Result<HandlerOutput, StepError> {
        let handler =
            self.registry
                .resolve(&node.op_type)
                .ok_or_else(|| WorkflowError::UnknownOperation {
                    node: node.name.clone(),
                    op_type: node.op_type.clone(),
                })?;

        let parameters = resolve_parameters(&node.parameters, &ctx.scope(input))?;

        let step = StepContext {
            node_name: node.name.clone(),
            node_type: node.op_type.clone(),
            parameters,
            input: input.clone(),
            run: ctx.clone(),
            events: self.events.create_emitter(ctx.run_id(), node.name.clone()),
            cancellation: cancellation.clone(),
            attempt,
        };

        self.events.emit(ExecutionEvent::NodeStarted {
            run_id: ctx.run_id(),
            node: node.name.clone(),
            node_type: node.op_type.clone(),
            attempt,
            timestamp: Utc::now(),
        });
        tracing::debug!("Dispatching node {} ({}), attempt {}", node.name, node.op_type, attempt);

        let output = match self.step_timeout {
            Some(limit) => timeout(limit, handler.handle(step))
                .await
                .map_err(|_| HandlerError::Timeout {
                    ms: limit.as_millis() as u64,
                })??,
            None => handler.handle(step).await?,
        };

        ctx.steps().record(
            &node.name,
            StepRecord {
                output: output.output.clone(),
                port: weftcore::Port::Main,
                branch: output.branch_or_default(),
                terminal: output.terminal,
            },
        )?;

        Ok(output)
    }
}

/// Resolve every parameter of a node against the run scope.
pub fn resolve_parameters(
    parameters: &Map<String, Json>,
    scope: &dyn Scope,
) -> Result<Parameters, StepError> {
    let mut resolved = Map::with_capacity(parameters.len());
    for (name, value) in parameters {
        let value = resolve_value(value, scope).map_err(|source| StepError::Resolve {
            parameter: name.clone(),
            source,
        })?;
        resolved.insert(name.clone(), value);
    }
    Ok(Parameters::new(resolved))
}
