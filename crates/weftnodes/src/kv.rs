use crate::txn::{in_transaction, Journal, Transactional};
use async_trait::async_trait;
use serde_json::{json, Value as Json};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use weftcore::{ExecutionId, Handler, HandlerError, HandlerOutput, StepContext};

type KvKey = (String, String);

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    value: Json,
    version: u64,
}

#[derive(Debug, Default)]
struct KvState {
    entries: HashMap<KvKey, Entry>,
    journal: Journal<KvKey, Entry>,
}

impl KvState {
    /// Set or clear `id`, journaling the old entry when `txn` names a run
    /// with an open transaction.
    fn apply(&mut self, txn: Option<ExecutionId>, id: KvKey, entry: Option<Entry>) {
        let previous = match entry {
            Some(entry) => self.entries.insert(id.clone(), entry),
            None => self.entries.remove(&id),
        };
        if let Some(run_id) = txn {
            self.journal.record(run_id, id, previous);
        }
    }
}

/// In-process key/value store, partitioned by tenant.
///
/// Versions start at 1 on first write; an absent key has version 0, so a
/// `cas_put` expecting 0 is a create-if-absent.
#[derive(Debug, Default)]
pub struct MemoryKv {
    state: RwLock<KvState>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value and version, if the key exists for `tenant`.
    pub async fn get(&self, tenant: &str, key: &str) -> Option<(Json, u64)> {
        let state = self.state.read().await;
        state
            .entries
            .get(&(tenant.to_string(), key.to_string()))
            .map(|e| (e.value.clone(), e.version))
    }
}

#[async_trait]
impl Transactional for MemoryKv {
    async fn commit(&self, run_id: ExecutionId) {
        self.state.write().await.journal.forget(run_id);
    }

    async fn rollback(&self, run_id: ExecutionId) -> usize {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        state.journal.undo(run_id, &mut state.entries)
    }
}

/// `kv.get`, `kv.put`, `kv.cas_put` and `kv.delete` over a [`MemoryKv`].
pub struct KvHandler {
    store: Arc<MemoryKv>,
}

impl KvHandler {
    pub fn new(store: Arc<MemoryKv>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Handler for KvHandler {
    async fn handle(&self, ctx: StepContext) -> Result<HandlerOutput, HandlerError> {
        let tenant = ctx.require_tenant()?.to_string();
        let key = ctx.parameters.require_str("key")?.to_string();
        let id = (tenant, key.clone());
        let value = || {
            ctx.parameters
                .get("value")
                .cloned()
                .unwrap_or_else(|| ctx.input.clone())
        };

        let txn = in_transaction(&ctx).then(|| ctx.run.run_id());

        let output = match ctx.operation() {
            "get" => {
                let state = self.store.state.read().await;
                match state.entries.get(&id) {
                    Some(entry) => json!({
                        "key": key,
                        "value": entry.value,
                        "version": entry.version,
                        "found": true,
                    }),
                    None => json!({ "key": key, "value": null, "version": 0, "found": false }),
                }
            }
            "put" => {
                let mut state = self.store.state.write().await;
                let version = state.entries.get(&id).map_or(0, |e| e.version) + 1;
                state.apply(txn, id, Some(Entry { value: value(), version }));
                json!({ "key": key, "version": version })
            }
            "cas_put" => {
                let expected = ctx.parameters.require_u64("expectedVersion")?;
                let mut state = self.store.state.write().await;
                let actual = state.entries.get(&id).map_or(0, |e| e.version);
                if actual != expected {
                    tracing::warn!(
                        "CAS conflict on {}: expected version {}, found {}",
                        key,
                        expected,
                        actual
                    );
                    return Err(HandlerError::Conflict {
                        key,
                        expected,
                        actual,
                    });
                }
                let version = actual + 1;
                state.apply(txn, id, Some(Entry { value: value(), version }));
                json!({ "key": key, "version": version })
            }
            "delete" => {
                let mut state = self.store.state.write().await;
                let deleted = state.entries.contains_key(&id);
                if deleted {
                    state.apply(txn, id, None);
                }
                json!({ "key": key, "deleted": deleted })
            }
            other => {
                return Err(HandlerError::Validation(format!(
                    "unsupported kv operation '{}'",
                    other
                )))
            }
        };

        Ok(HandlerOutput::new(output))
    }

    fn description(&self) -> &str {
        "Tenant-scoped key/value store with compare-and-swap"
    }
}

