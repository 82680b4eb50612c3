use crate::{EventEmitter, ExecutionContext, HandlerError, Parameters};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tokio_util::sync::CancellationToken;

/// Core trait every operation handler implements.
///
/// A handler is looked up by the node's `type` string. It receives the node's
/// parameters already resolved against the run scope and returns an output
/// plus, for branching handlers, the output index to follow.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: StepContext) -> Result<HandlerOutput, HandlerError>;

    /// One-line description shown by `weft ops`.
    fn description(&self) -> &str {
        ""
    }
}

/// Everything a handler sees for one invocation.
#[derive(Clone)]
pub struct StepContext {
    pub node_name: String,
    pub node_type: String,

    /// Parameters with every template already resolved.
    pub parameters: Parameters,

    /// `$json` for this step.
    pub input: Json,

    pub run: ExecutionContext,

    pub events: EventEmitter,

    /// Run-scoped token; handlers check it between their own suspension points.
    pub cancellation: CancellationToken,

    /// 1 on the first attempt, incremented on every retry.
    pub attempt: u32,
}

impl StepContext {
    /// Tenant from `$context`; storage-facing handlers refuse to run without one.
    pub fn require_tenant(&self) -> Result<&str, HandlerError> {
        self.run.tenant_id().ok_or(HandlerError::MissingTenant)
    }

    /// The last segment of the node type, e.g. `cas_put` for `kv.cas_put`.
    pub fn operation(&self) -> &str {
        self.node_type
            .rsplit_once('.')
            .map(|(_, op)| op)
            .unwrap_or(&self.node_type)
    }

    pub fn check_cancelled(&self) -> Result<(), HandlerError> {
        if self.cancellation.is_cancelled() {
            Err(HandlerError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Output from one handler invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HandlerOutput {
    pub output: Json,

    /// Main output index to follow; `None` means 0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_index: Option<usize>,

    /// Marks the run complete with `output` as its response.
    #[serde(default)]
    pub terminal: bool,
}

impl HandlerOutput {
    pub fn new(output: Json) -> Self {
        Self {
            output,
            branch_index: None,
            terminal: false,
        }
    }

    pub fn branch(output: Json, index: usize) -> Self {
        Self {
            output,
            branch_index: Some(index),
            terminal: false,
        }
    }

    pub fn respond(payload: Json) -> Self {
        Self {
            output: payload,
            branch_index: None,
            terminal: true,
        }
    }

    pub fn branch_or_default(&self) -> usize {
        self.branch_index.unwrap_or(0)
    }
}

impl From<Json> for HandlerOutput {
    fn from(output: Json) -> Self {
        Self::new(output)
    }
}

/// Registry listing entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationMetadata {
    pub op_type: String,
    pub description: String,
    pub family: bool,
}
