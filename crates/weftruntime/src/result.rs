use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Every dispatched node completed.
    Succeeded,
    /// The run finished but some node failed under `onError: continue`.
    Partial,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
        }
    }
}

/// Outcome of one run: `{status, completedNodeNames, failedNode?, error?}`.
///
/// `response` and `warnings` are for the host only and never serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub status: RunStatus,
    pub completed_node_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Payload of the terminal `respond.*` node, if one ran.
    #[serde(skip)]
    pub response: Option<Json>,
    #[serde(skip)]
    pub warnings: Vec<String>,
}

impl RunResult {
    /// A run that failed before any node was dispatched.
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Failed,
            completed_node_names: Vec::new(),
            failed_node: None,
            error: Some(error.into()),
            response: None,
            warnings: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}
