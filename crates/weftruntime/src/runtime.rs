use crate::plan::ExecutionPlan;
use crate::registry::OperationRegistry;
use crate::result::RunResult;
use crate::WorkflowExecutor;
use serde::Deserialize;
use serde_json::{Map, Value as Json};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use weftcore::{
    resolve_variables, EventBus, ExecutionContext, ExecutionEvent, ExecutionId, Issue,
    PersistenceAdapter, RequestContext, TypeCatalog, ValidationOptions, ValidationReport, Validator,
    WorkflowDefinition, WorkflowError,
};

/// Validates and runs workflow documents against one operation registry.
pub struct Engine {
    registry: Arc<OperationRegistry>,
    event_bus: Arc<EventBus>,
    config: RuntimeConfig,
    persistence: Option<Arc<dyn PersistenceAdapter>>,
}

impl Engine {
    /// Create an engine with default settings and an empty registry
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create an engine with custom configuration
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::with_registry(Arc::new(OperationRegistry::new()), config)
    }

    /// Create an engine with a pre-populated registry
    pub fn with_registry(registry: Arc<OperationRegistry>, config: RuntimeConfig) -> Self {
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        Self {
            registry,
            event_bus,
            config,
            persistence: None,
        }
    }

    /// Checkpoint every run through `persistence`
    pub fn with_persistence(mut self, persistence: Arc<dyn PersistenceAdapter>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    /// Get the event bus for direct access
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Validate with the engine's configured strictness and tenant mode.
    pub fn validate(&self, document: &Json) -> ValidationReport {
        self.validate_with(
            document,
            ValidationOptions {
                strict: self.config.strict_validation,
                tenant_mode: self.config.tenant_mode,
            },
        )
    }

    /// Schema rules plus the graph pass: cycles are errors, orphan and
    /// unreachable nodes are warnings. Operation types are checked against
    /// the registry.
    pub fn validate_with(&self, document: &Json, options: ValidationOptions) -> ValidationReport {
        let catalog: &dyn TypeCatalog = &*self.registry;
        let mut report = Validator::new().validate(document, options, Some(catalog));

        // schema errors elsewhere in the document must not hide a cycle
        let workflow = WorkflowDefinition::from_json(document.clone())
            .ok()
            .or_else(|| WorkflowDefinition::graph_of(document));
        if let Some(workflow) = workflow {
            match ExecutionPlan::build(&workflow) {
                Ok(plan) => report.extend(plan.issues(), options.strict),
                Err(e @ WorkflowError::Cycle { .. }) => report.extend(
                    [Issue::error("connections", e.to_string(), "graph")],
                    options.strict,
                ),
                // duplicate names are already reported by the schema rules
                Err(_) => {}
            }
        }

        for issue in report.warnings() {
            tracing::warn!("Validation {}", issue);
        }
        report
    }

    /// Run a workflow document with `input` as the start nodes' `$json`.
    pub async fn execute(&self, document: &Json, input: Json, request: RequestContext) -> RunResult {
        self.execute_with(document, input, request, RunOptions::default())
            .await
    }

    pub async fn execute_with(
        &self,
        document: &Json,
        input: Json,
        request: RequestContext,
        options: RunOptions,
    ) -> RunResult {
        if self.config.validate_before_run {
            let report = self.validate(document);
            if !report.ok {
                let issues: Vec<String> = report
                    .issues
                    .iter()
                    .filter(|i| i.is_error() || self.config.strict_validation)
                    .map(|i| i.to_string())
                    .collect();
                tracing::warn!("Rejecting workflow: {}", issues.join("; "));
                return RunResult::rejected(format!("validation failed: {}", issues.join("; ")));
            }
        }

        let workflow = match WorkflowDefinition::from_json(document.clone()) {
            Ok(workflow) => workflow,
            Err(e) => return RunResult::rejected(e.to_string()),
        };

        let config = match resolve_variables(&workflow.variables, &options.variables) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("Variable resolution failed for {}: {}", workflow.id, e);
                return RunResult::rejected(e.to_string());
            }
        };

        let mut ctx = ExecutionContext::new(request, config);
        if let Some(run_id) = options.run_id {
            ctx = ctx.with_run_id(run_id);
        }

        let plan = match ExecutionPlan::build(&workflow) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::error!("Cannot plan workflow {}: {}", workflow.id, e);
                return RunResult::rejected(e.to_string());
            }
        };

        let max_parallel = workflow
            .settings
            .max_parallel_nodes
            .unwrap_or(self.config.max_parallel_nodes);
        let step_timeout = workflow
            .settings
            .step_timeout_ms
            .or(self.config.step_timeout_ms)
            .map(Duration::from_millis);

        WorkflowExecutor::new(max_parallel)
            .with_step_timeout(step_timeout)
            .with_persistence(self.persistence.clone())
            .execute(
                &workflow,
                &plan,
                self.registry.clone(),
                &self.event_bus,
                ctx,
                input,
                options.cancellation,
            )
            .await
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-run knobs beyond the document and its input.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Variable overrides; these win over `defaultValue`.
    pub variables: Map<String, Json>,
    pub cancellation: CancellationToken,
    /// Reuse a run id, e.g. to resume from a checkpoint.
    pub run_id: Option<ExecutionId>,
}

impl RunOptions {
    pub fn with_variable(mut self, name: impl Into<String>, value: Json) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn with_run_id(mut self, run_id: ExecutionId) -> Self {
        self.run_id = Some(run_id);
        self
    }
}

/// Configuration for the engine
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub max_parallel_nodes: usize,
    pub event_buffer_size: usize,
    pub strict_validation: bool,
    pub tenant_mode: bool,
    pub step_timeout_ms: Option<u64>,
    pub validate_before_run: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_parallel_nodes: 10,
            event_buffer_size: 1000,
            strict_validation: false,
            tenant_mode: false,
            step_timeout_ms: None,
            validate_before_run: true,
        }
    }
}
