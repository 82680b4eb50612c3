//! Workflow execution runtime
//!
//! This crate provides the engine that runs workflow documents: the
//! operation registry, the DAG plan, the wave scheduler with its error and
//! retry manager, and the `Engine` facade that ties them together.

mod executor;
mod plan;
mod registry;
mod result;
mod retry;
mod runtime;
mod step;

pub use executor::WorkflowExecutor;
pub use plan::{ExecutionPlan, GraphWarning, PlannedEdge};
pub use registry::{FnHandler, OperationRegistry};
pub use result::{RunResult, RunStatus};
pub use retry::{backoff_for, Backoff, ErrorManager, ExponentialBackoff, FixedBackoff, StepOutcome};
pub use runtime::{Engine, RunOptions, RuntimeConfig};
pub use step::{resolve_parameters, StepError, StepExecutor};
