use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Handler error: {0}")]
    Handler(#[from] HandlerError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),

    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Broad failure classes used by the retry policy and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Digest mismatch, CAS conflict. Fatal, never retried.
    DataIntegrity,
    /// Missing or malformed data, type mismatch. Never retried.
    Schema,
    /// Network/timeout class failures. Retryable.
    Transient,
    Cancelled,
}

/// Failure reported by an operation handler.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HandlerError {
    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Timeout after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Version conflict on '{key}': expected {expected}, found {actual}")]
    Conflict {
        key: String,
        expected: u64,
        actual: u64,
    },

    #[error("Digest mismatch for '{key}': expected {expected}, got {actual}")]
    DigestMismatch {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid type for '{field}': expected {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("No tenantId in request context")]
    MissingTenant,

    #[error("Execution failed: {0}")]
    Failed(String),

    #[error("Cancelled")]
    Cancelled,
}

impl HandlerError {
    pub fn class(&self) -> ErrorClass {
        match self {
            HandlerError::Conflict { .. } | HandlerError::DigestMismatch { .. } => {
                ErrorClass::DataIntegrity
            }
            HandlerError::TypeMismatch { .. }
            | HandlerError::Validation(_)
            | HandlerError::MissingParameter(_)
            | HandlerError::MissingTenant => ErrorClass::Schema,
            HandlerError::Transient(_) | HandlerError::Timeout { .. } | HandlerError::Failed(_) => {
                ErrorClass::Transient
            }
            HandlerError::Cancelled => ErrorClass::Cancelled,
        }
    }

    /// Whether a retry policy may re-invoke the handler after this error.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    pub fn type_mismatch(
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: &serde_json::Value,
    ) -> Self {
        HandlerError::TypeMismatch {
            field: field.into(),
            expected: expected.into(),
            actual: crate::value::json_type_name(actual).to_string(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("Workflow not found: {0}")]
    NotFound(String),

    #[error("Invalid workflow: {0}")]
    Invalid(String),

    #[error("Cycle detected: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("No handler registered for operation type '{op_type}' (node '{node}')")]
    UnknownOperation { node: String, op_type: String },

    #[error("Required variable '{0}' has no value")]
    VariableMissing(String),

    #[error("Variable '{name}' cannot be read as {expected}: {message}")]
    VariableType {
        name: String,
        expected: String,
        message: String,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Syntax error at {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("Unresolved reference: {path}")]
    Unresolved { path: String },

    #[error("Unknown root '{0}' (expected $json, $context, $config or $steps)")]
    UnknownRoot(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Bad argument to {function}: {message}")]
    BadArgument { function: String, message: String },

    #[error("Cannot index into {0}")]
    NotIndexable(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContextError {
    #[error("Context key '{key}' missing or wrong type (expected {expected})")]
    Missing { key: String, expected: &'static str },

    #[error("Step output for '{node}' already recorded")]
    AlreadyRecorded { node: String },

    #[error("Handle '{0}' is no longer alive")]
    HandleGone(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistenceError {
    #[error("Checkpoint store unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt checkpoint for run {run_id}: {message}")]
    Corrupt { run_id: String, message: String },
}
