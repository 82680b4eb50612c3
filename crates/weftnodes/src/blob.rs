use crate::txn::{in_transaction, Journal, Transactional};
use async_trait::async_trait;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use weftcore::{ExecutionId, Handler, HandlerError, HandlerOutput, StepContext};

/// Lowercase hex SHA-256 of `content`.
pub fn digest(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}

type BlobKey = (String, String);

#[derive(Debug, Default)]
struct BlobState {
    blobs: HashMap<BlobKey, String>,
    journal: Journal<BlobKey, String>,
}

/// In-process blob store, partitioned by tenant.
#[derive(Debug, Default)]
pub struct MemoryBlobs {
    state: RwLock<BlobState>,
}

impl MemoryBlobs {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.blobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn get(&self, tenant: &str, key: &str) -> Option<String> {
        let state = self.state.read().await;
        state
            .blobs
            .get(&(tenant.to_string(), key.to_string()))
            .cloned()
    }
}

#[async_trait]
impl Transactional for MemoryBlobs {
    async fn commit(&self, run_id: ExecutionId) {
        self.state.write().await.journal.forget(run_id);
    }

    async fn rollback(&self, run_id: ExecutionId) -> usize {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        state.journal.undo(run_id, &mut state.blobs)
    }
}

/// `blob.get`, `blob.put` and `blob.verify_digest` over [`MemoryBlobs`].
///
/// A digest mismatch is a data-integrity failure: the run stops and the
/// step is never retried.
pub struct BlobHandler {
    store: Arc<MemoryBlobs>,
}

impl BlobHandler {
    pub fn new(store: Arc<MemoryBlobs>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Handler for BlobHandler {
    async fn handle(&self, ctx: StepContext) -> Result<HandlerOutput, HandlerError> {
        let tenant = ctx.require_tenant()?.to_string();
        let key = ctx.parameters.require_str("key")?.to_string();
        let id = (tenant, key.clone());

        let output = match ctx.operation() {
            "put" => {
                let content = ctx.parameters.require_str("content")?;
                let actual = digest(content.as_bytes());
                if let Some(expected) = ctx.parameters.get_str("digest") {
                    if expected != actual {
                        return Err(HandlerError::DigestMismatch {
                            key,
                            expected: expected.to_string(),
                            actual,
                        });
                    }
                }
                let mut state = self.store.state.write().await;
                let previous = state.blobs.insert(id.clone(), content.to_string());
                if in_transaction(&ctx) {
                    state.journal.record(ctx.run.run_id(), id, previous);
                }
                json!({ "key": key, "digest": actual, "size": content.len() })
            }
            "get" => {
                let state = self.store.state.read().await;
                let content = state
                    .blobs
                    .get(&id)
                    .ok_or_else(|| HandlerError::Validation(format!("blob '{}' not found", key)))?;
                json!({ "key": key, "content": content, "digest": digest(content.as_bytes()) })
            }
            "verify_digest" => {
                let expected = ctx.parameters.require_str("digest")?;
                let state = self.store.state.read().await;
                let content = state
                    .blobs
                    .get(&id)
                    .ok_or_else(|| HandlerError::Validation(format!("blob '{}' not found", key)))?;
                let actual = digest(content.as_bytes());
                if actual != expected {
                    return Err(HandlerError::DigestMismatch {
                        key,
                        expected: expected.to_string(),
                        actual,
                    });
                }
                json!({ "key": key, "digest": actual, "verified": true })
            }
            other => {
                return Err(HandlerError::Validation(format!(
                    "unsupported blob operation '{}'",
                    other
                )))
            }
        };

        Ok(HandlerOutput::new(output))
    }

    fn description(&self) -> &str {
        "Tenant-scoped blob store with SHA-256 digests"
    }
}
