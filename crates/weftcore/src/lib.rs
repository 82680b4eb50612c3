//! Core abstractions for the weft workflow engine
//!
//! This crate provides the workflow document model, the expression resolver,
//! the per-run execution context, the schema validator and the handler
//! contract. It schedules nothing; see `weftruntime` for that.

mod context;
mod error;
pub mod events;
pub mod expression;
mod handler;
mod parameter;
mod persistence;
pub mod validation;
mod value;
mod variables;
mod workflow;

pub use context::{
    ExecutionContext, ExecutionId, HandleTable, HostResource, RequestContext, StepOutputs,
    StepRecord, StepScope, ValueStore,
};
pub use error::{
    ContextError, ErrorClass, ExpressionError, FlowError, HandlerError, PersistenceError,
    WorkflowError,
};
pub use events::*;
pub use handler::{Handler, HandlerOutput, OperationMetadata, StepContext};
pub use parameter::{ParameterValue, Parameters};
pub use persistence::{Checkpoint, PersistenceAdapter};
pub use validation::{
    validate, Issue, IssueKind, TypeCatalog, ValidationOptions, ValidationReport, Validator,
};
pub use value::{is_truthy, json_type_name, FromValue, Value};
pub use variables::{coerce, resolve_variables};
pub use workflow::{
    ConnectionTarget, Connections, Edge, NodeSpec, OnError, Port, RetryPolicy, TriggerKind,
    TriggerSpec, Variable, VariableType, WorkflowDefinition, WorkflowSettings,
};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
