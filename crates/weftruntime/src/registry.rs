use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use weftcore::{
    Handler, HandlerError, HandlerOutput, OperationMetadata, StepContext, TypeCatalog,
};

const FAMILY_SUFFIX: &str = ".*";

/// Adapts an async closure into a [`Handler`].
pub struct FnHandler<F> {
    func: F,
    description: String,
}

impl<F> FnHandler<F> {
    pub fn new(func: F) -> Self {
        Self {
            func,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(StepContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HandlerOutput, HandlerError>> + Send + 'static,
{
    async fn handle(&self, ctx: StepContext) -> Result<HandlerOutput, HandlerError> {
        (self.func)(ctx).await
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// Maps operation-type strings to handlers.
///
/// Populated once at host startup and shared read-only afterwards. A type
/// ending in `.*` registers a family: `kv.*` serves every `kv.<op>` that has
/// no exact registration of its own.
pub struct OperationRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
    families: HashMap<String, Arc<dyn Handler>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            families: HashMap::new(),
        }
    }

    /// Register a handler for an exact type or a `prefix.*` family
    pub fn register(&mut self, op_type: impl Into<String>, handler: Arc<dyn Handler>) {
        let op_type = op_type.into();
        tracing::info!("Registering operation type: {}", op_type);
        match op_type.strip_suffix(FAMILY_SUFFIX) {
            Some(prefix) => {
                self.families.insert(prefix.to_string(), handler);
            }
            None => {
                self.handlers.insert(op_type, handler);
            }
        }
    }

    /// Register an async closure as a handler
    pub fn register_fn<F, Fut>(&mut self, op_type: impl Into<String>, func: F)
    where
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HandlerOutput, HandlerError>> + Send + 'static,
    {
        self.register(op_type, Arc::new(FnHandler::new(func)));
    }

    /// Find the handler for a node type.
    ///
    /// The exact registration wins; otherwise the longest registered family
    /// prefix does (`a.b.*` before `a.*`).
    pub fn resolve(&self, op_type: &str) -> Option<Arc<dyn Handler>> {
        if let Some(handler) = self.handlers.get(op_type) {
            return Some(handler.clone());
        }
        let mut prefix = op_type;
        while let Some((head, _)) = prefix.rsplit_once('.') {
            if let Some(handler) = self.families.get(head) {
                return Some(handler.clone());
            }
            prefix = head;
        }
        None
    }

    pub fn contains(&self, op_type: &str) -> bool {
        self.resolve(op_type).is_some()
    }

    /// All registrations, families shown as `prefix.*`, sorted by type
    pub fn list(&self) -> Vec<OperationMetadata> {
        let exact = self.handlers.iter().map(|(op_type, handler)| OperationMetadata {
            op_type: op_type.clone(),
            description: handler.description().to_string(),
            family: false,
        });
        let families = self.families.iter().map(|(prefix, handler)| OperationMetadata {
            op_type: format!("{}{}", prefix, FAMILY_SUFFIX),
            description: handler.description().to_string(),
            family: true,
        });
        let mut all: Vec<OperationMetadata> = exact.chain(families).collect();
        all.sort_by(|a, b| a.op_type.cmp(&b.op_type));
        all
    }

    pub fn metadata(&self, op_type: &str) -> Option<OperationMetadata> {
        self.resolve(op_type).map(|handler| OperationMetadata {
            op_type: op_type.to_string(),
            description: handler.description().to_string(),
            family: !self.handlers.contains_key(op_type),
        })
    }

    pub fn len(&self) -> usize {
        self.handlers.len() + self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeCatalog for OperationRegistry {
    fn knows(&self, op_type: &str) -> bool {
        self.contains(op_type)
    }
}
