use crate::{ExecutionId, PersistenceError, StepRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Snapshot of a run's `$steps` taken after a wave completes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub workflow_id: String,
    pub steps: BTreeMap<String, StepRecord>,
    /// Nodes that failed under `onError: continue`, with their error.
    #[serde(default)]
    pub continued: BTreeMap<String, String>,
    pub saved_at: DateTime<Utc>,
}

/// Pluggable store for checkpoints, so a run interrupted by a process
/// restart can resume without re-dispatching finished steps.
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    async fn save(&self, run_id: ExecutionId, checkpoint: &Checkpoint)
        -> Result<(), PersistenceError>;

    async fn load(&self, run_id: ExecutionId) -> Result<Option<Checkpoint>, PersistenceError>;
}
