//! Standard handler library
//!
//! Reference handlers for the operation families that need no external
//! system: flow control, reshaping, field checks, transactions,
//! in-memory key/value and blob stores, and outbound HTTP.

mod blob;
mod flow;
mod http;
mod kv;
mod transform;
mod txn;

pub use blob::{digest, BlobHandler, MemoryBlobs};
pub use flow::{ConditionHandler, EmitEventHandler, RespondHandler, ValidateFieldsHandler};
pub use http::ProxyFetchHandler;
pub use kv::{KvHandler, MemoryKv};
pub use transform::{JsonParseHandler, TransformHandler};
pub use txn::{in_transaction, Transactional, TxnHandler, TXN_ACTIVE};
use weftruntime::OperationRegistry;

use std::sync::Arc;

/// Stores backing the in-memory `kv.*` and `blob.*` handlers.
#[derive(Debug, Clone, Default)]
pub struct Stores {
    pub kv: Arc<MemoryKv>,
    pub blobs: Arc<MemoryBlobs>,
}

/// Register all standard handlers with fresh in-memory stores
pub fn register_all(registry: &mut OperationRegistry) -> Stores {
    let stores = Stores::default();
    register_with(registry, &stores);
    stores
}

/// Register all standard handlers over the given stores
pub fn register_with(registry: &mut OperationRegistry, stores: &Stores) {
    registry.register("condition", Arc::new(ConditionHandler));
    registry.register("transform", Arc::new(TransformHandler));
    registry.register("respond.*", Arc::new(RespondHandler));
    registry.register("emit.event", Arc::new(EmitEventHandler));
    let participants: Vec<Arc<dyn Transactional>> = vec![
        stores.kv.clone() as Arc<dyn Transactional>,
        stores.blobs.clone() as Arc<dyn Transactional>,
    ];
    registry.register("txn.*", Arc::new(TxnHandler::new(participants)));
    registry.register("validate.fields", Arc::new(ValidateFieldsHandler));
    registry.register("parse.json", Arc::new(JsonParseHandler));
    registry.register("kv.*", Arc::new(KvHandler::new(stores.kv.clone())));
    registry.register("blob.*", Arc::new(BlobHandler::new(stores.blobs.clone())));
    registry.register("proxy.fetch", Arc::new(ProxyFetchHandler::new()));
}
