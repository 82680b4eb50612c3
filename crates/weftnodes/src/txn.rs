use async_trait::async_trait;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use weftcore::{ExecutionId, Handler, HandlerError, HandlerOutput, StepContext};

/// Store key holding the active-transaction marker.
pub const TXN_ACTIVE: &str = "txn.active";

/// Whether the run behind `ctx` has an open transaction.
pub fn in_transaction(ctx: &StepContext) -> bool {
    ctx.run.store().get_bool(TXN_ACTIVE, false)
}

/// A store whose writes inside a run's transaction can be undone.
#[async_trait]
pub trait Transactional: Send + Sync {
    /// Keep everything `run_id` wrote since `txn.begin`.
    async fn commit(&self, run_id: ExecutionId);

    /// Put back every value `run_id` overwrote or removed since `txn.begin`.
    /// Returns the number of writes undone.
    async fn rollback(&self, run_id: ExecutionId) -> usize;
}

/// Prior values of the keys each run wrote inside its open transaction.
#[derive(Debug)]
pub(crate) struct Journal<K, V> {
    runs: HashMap<ExecutionId, Vec<(K, Option<V>)>>,
}

impl<K, V> Default for Journal<K, V> {
    fn default() -> Self {
        Self {
            runs: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash, V> Journal<K, V> {
    pub(crate) fn record(&mut self, run_id: ExecutionId, key: K, previous: Option<V>) {
        self.runs.entry(run_id).or_default().push((key, previous));
    }

    pub(crate) fn forget(&mut self, run_id: ExecutionId) {
        self.runs.remove(&run_id);
    }

    /// Replay `run_id`'s journal backwards into `map`.
    pub(crate) fn undo(&mut self, run_id: ExecutionId, map: &mut HashMap<K, V>) -> usize {
        let writes = self.runs.remove(&run_id).unwrap_or_default();
        let undone = writes.len();
        for (key, previous) in writes.into_iter().rev() {
            match previous {
                Some(value) => {
                    map.insert(key, value);
                }
                None => {
                    map.remove(&key);
                }
            }
        }
        undone
    }
}

/// `txn.begin`, `txn.commit` and `txn.abort`.
///
/// Tracks the run's transaction marker and tells the participating stores
/// to keep or undo the writes made while it was set.
pub struct TxnHandler {
    participants: Vec<Arc<dyn Transactional>>,
}

impl TxnHandler {
    pub fn new(participants: Vec<Arc<dyn Transactional>>) -> Self {
        Self { participants }
    }
}

#[async_trait]
impl Handler for TxnHandler {
    async fn handle(&self, ctx: StepContext) -> Result<HandlerOutput, HandlerError> {
        let store = ctx.run.store();
        let active = in_transaction(&ctx);
        let run_id = ctx.run.run_id();

        match ctx.operation() {
            "begin" => {
                if active {
                    return Err(HandlerError::Validation(
                        "a transaction is already active".to_string(),
                    ));
                }
                store.set(TXN_ACTIVE, true);
            }
            op @ ("commit" | "abort") => {
                if !active {
                    return Err(HandlerError::Validation(format!(
                        "cannot {}: no active transaction",
                        op
                    )));
                }
                if op == "commit" {
                    for participant in &self.participants {
                        participant.commit(run_id).await;
                    }
                } else {
                    let mut undone = 0;
                    for participant in &self.participants {
                        undone += participant.rollback(run_id).await;
                    }
                    tracing::info!("Rolled back {} write(s) in run {}", undone, run_id);
                }
                store.remove(TXN_ACTIVE);
            }
            other => {
                return Err(HandlerError::Validation(format!(
                    "unsupported transaction operation '{}'",
                    other
                )))
            }
        }

        tracing::debug!("Transaction {} in run {}", ctx.operation(), run_id);
        Ok(HandlerOutput::new(ctx.input))
    }

    fn description(&self) -> &str {
        "Open, commit or abort the run's transaction"
    }
}
