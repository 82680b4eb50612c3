use crate::plan::ExecutionPlan;
use crate::registry::OperationRegistry;
use crate::result::{RunResult, RunStatus};
use crate::retry::{ErrorManager, StepOutcome};
use crate::step::StepExecutor;
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::{json, Value as Json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use weftcore::{
    Checkpoint, EventBus, ExecutionContext, ExecutionEvent, HandlerOutput, PersistenceAdapter,
    Port, StepRecord, WorkflowDefinition,
};

const CANCELLED: &str = "run cancelled";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeState {
    Pending,
    /// The source realized this port/index.
    Live,
    /// The source took another branch, was skipped or never runs.
    Dead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Waiting,
    Done,
    Skipped,
}

/// Per-run scheduling state over a plan.
struct RunState<'p> {
    plan: &'p ExecutionPlan,
    edges: Vec<EdgeState>,
    payloads: Vec<Json>,
    nodes: Vec<NodeState>,
    completed: Vec<String>,
    warnings: Vec<String>,
    continued: BTreeMap<String, String>,
    response: Option<Json>,
    terminal: bool,
}

impl<'p> RunState<'p> {
    fn new(plan: &'p ExecutionPlan) -> Self {
        let mut state = Self {
            plan,
            edges: vec![EdgeState::Pending; plan.edges().len()],
            payloads: vec![Json::Null; plan.edges().len()],
            nodes: vec![NodeState::Waiting; plan.len()],
            completed: Vec::new(),
            warnings: Vec::new(),
            continued: BTreeMap::new(),
            response: None,
            terminal: false,
        };
        for node in 0..plan.len() {
            if !plan.is_reachable(node) {
                state.skip(node);
            }
        }
        state
    }

    fn skip(&mut self, node: usize) {
        self.nodes[node] = NodeState::Skipped;
        for &e in self.plan.outgoing(node) {
            self.edges[e] = EdgeState::Dead;
        }
    }

    /// Skip every waiting node whose inputs are all dead, transitively.
    fn settle(&mut self) -> Vec<usize> {
        let mut skipped = Vec::new();
        loop {
            let dead: Vec<usize> = (0..self.plan.len())
                .filter(|&node| {
                    let incoming = self.plan.incoming(node);
                    self.nodes[node] == NodeState::Waiting
                        && !self.plan.is_start(node)
                        && !incoming.is_empty()
                        && incoming.iter().all(|&e| self.edges[e] == EdgeState::Dead)
                })
                .collect();
            if dead.is_empty() {
                return skipped;
            }
            for node in dead {
                self.skip(node);
                skipped.push(node);
            }
        }
    }

    /// Nodes with no pending input and at least one live one, plus start
    /// nodes that have not run yet. Declaration order.
    fn ready(&self) -> Vec<usize> {
        (0..self.plan.len())
            .filter(|&node| {
                if self.nodes[node] != NodeState::Waiting {
                    return false;
                }
                if self.plan.is_start(node) {
                    return true;
                }
                let incoming = self.plan.incoming(node);
                !incoming.iter().any(|&e| self.edges[e] == EdgeState::Pending)
                    && incoming.iter().any(|&e| self.edges[e] == EdgeState::Live)
            })
            .collect()
    }

    /// `$json` for a ready node. A single live predecessor hands over its
    /// value; several are delivered as `[{node, output}]` in declaration order.
    fn input_for(&self, node: usize, run_input: &Json) -> Json {
        if self.plan.is_start(node) {
            return run_input.clone();
        }
        let mut live: Vec<usize> = self
            .plan
            .incoming(node)
            .iter()
            .copied()
            .filter(|&e| self.edges[e] == EdgeState::Live)
            .collect();
        live.sort_by_key(|&e| self.plan.edge(e).source);
        live.dedup_by_key(|e| self.plan.edge(*e).source);

        match live.as_slice() {
            [only] => self.payloads[*only].clone(),
            edges => Json::Array(
                edges
                    .iter()
                    .map(|&e| {
                        json!({
                            "node": self.plan.name(self.plan.edge(e).source),
                            "output": self.payloads[e].clone(),
                        })
                    })
                    .collect(),
            ),
        }
    }

    /// Mark `node` done and make `port`/`output` the only live exit.
    fn complete(&mut self, node: usize, port: Port, output: usize, payload: Json) {
        self.nodes[node] = NodeState::Done;
        for &e in self.plan.outgoing(node) {
            let edge = self.plan.edge(e);
            if edge.port == port && edge.output == output {
                self.edges[e] = EdgeState::Live;
                self.payloads[e] = payload.clone();
            } else {
                self.edges[e] = EdgeState::Dead;
            }
        }
    }

    fn apply(&mut self, node: usize, outcome: StepOutcome) -> Option<(Option<String>, String)> {
        let name = self.plan.name(node).to_string();
        match outcome {
            StepOutcome::Completed(output) => {
                self.completed.push(name);
                self.complete(
                    node,
                    Port::Main,
                    output.branch_or_default(),
                    output.output.clone(),
                );
                if output.terminal {
                    self.terminal = true;
                    self.response = Some(output.output);
                }
                None
            }
            StepOutcome::Continued { error } => {
                self.warnings.push(format!("{}: {}", name, error));
                if self.plan.has_port(node, Port::Error) {
                    let payload = json!({ "error": error, "node": name });
                    self.complete(node, Port::Error, 0, payload);
                } else {
                    self.complete(node, Port::Main, 0, Json::Null);
                }
                self.continued.insert(name, error);
                None
            }
            StepOutcome::Failed { error } => {
                self.nodes[node] = NodeState::Done;
                Some((Some(name), error))
            }
            StepOutcome::Cancelled => Some((None, CANCELLED.to_string())),
        }
    }
}

/// Runs a planned workflow wave by wave.
///
/// Every wave dispatches all ready nodes concurrently, bounded by
/// `max_parallel`, then applies their outcomes in declaration order. The
/// cancellation token is checked before each wave.
pub struct WorkflowExecutor {
    max_parallel: usize,
    step_timeout: Option<Duration>,
    persistence: Option<Arc<dyn PersistenceAdapter>>,
}

impl WorkflowExecutor {
    pub fn new(max_parallel: usize) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
            step_timeout: None,
            persistence: None,
        }
    }

    pub fn with_step_timeout(mut self, step_timeout: Option<Duration>) -> Self {
        self.step_timeout = step_timeout;
        self
    }

    pub fn with_persistence(mut self, persistence: Option<Arc<dyn PersistenceAdapter>>) -> Self {
        self.persistence = persistence;
        self
    }

    /// Execute a workflow and return its run result
    #[allow(clippy::too_many_arguments)]
    pub async fn execute(
        &self,
        workflow: &WorkflowDefinition,
        plan: &ExecutionPlan,
        registry: Arc<OperationRegistry>,
        event_bus: &EventBus,
        ctx: ExecutionContext,
        input: Json,
        cancellation: CancellationToken,
    ) -> RunResult {
        let run_id = ctx.run_id();
        let start_time = Instant::now();

        event_bus.emit(ExecutionEvent::RunStarted {
            run_id,
            workflow_id: workflow.id.clone(),
            timestamp: Utc::now(),
        });
        tracing::info!("Starting workflow execution: {} (run {})", workflow.id, run_id);

        let step = StepExecutor::new(registry, event_bus.clone()).with_timeout(self.step_timeout);
        let manager = ErrorManager::new(step);
        let result = self
            .run_waves(workflow, plan, &manager, event_bus, &ctx, &input, &cancellation)
            .await;

        let duration_ms = start_time.elapsed().as_millis() as u64;
        tracing::info!(
            "Workflow {} finished: {} in {}ms",
            workflow.id,
            result.status.as_str(),
            duration_ms
        );
        event_bus.emit(ExecutionEvent::RunCompleted {
            run_id,
            status: result.status.as_str().to_string(),
            duration_ms,
            timestamp: Utc::now(),
        });

        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_waves(
        &self,
        workflow: &WorkflowDefinition,
        plan: &ExecutionPlan,
        manager: &ErrorManager,
        event_bus: &EventBus,
        ctx: &ExecutionContext,
        input: &Json,
        cancellation: &CancellationToken,
    ) -> RunResult {
        let run_id = ctx.run_id();
        let mut state = RunState::new(plan);
        let replay = self.load_checkpoint(ctx).await;
        let mut failure: Option<(Option<String>, String)> = None;
        let mut wave = 0;

        loop {
            if cancellation.is_cancelled() {
                tracing::warn!("Run {} cancelled before wave {}", run_id, wave + 1);
                failure = Some((None, CANCELLED.to_string()));
                break;
            }

            for node in state.settle() {
                tracing::debug!("Skipping node {}: no live input", plan.name(node));
                event_bus.emit(ExecutionEvent::NodeSkipped {
                    run_id,
                    node: plan.name(node).to_string(),
                    reason: "no live input".to_string(),
                    timestamp: Utc::now(),
                });
            }

            let ready = state.ready();
            if ready.is_empty() {
                break;
            }
            wave += 1;
            tracing::debug!(
                "Wave {}: {:?}",
                wave,
                ready.iter().map(|&n| plan.name(n)).collect::<Vec<_>>()
            );

            let mut outcomes: Vec<(usize, StepOutcome)> = Vec::new();
            let mut dispatch = Vec::new();
            for node in ready {
                let spec = &workflow.nodes[node];
                let node_input = state.input_for(node, input);
                if spec.disabled {
                    tracing::debug!("Node {} is disabled, passing input through", spec.name);
                    event_bus.emit(ExecutionEvent::NodeSkipped {
                        run_id,
                        node: spec.name.clone(),
                        reason: "disabled".to_string(),
                        timestamp: Utc::now(),
                    });
                    state.complete(node, Port::Main, 0, node_input);
                } else if let Some(outcome) = replay.as_ref().and_then(|cp| replayed(cp, ctx, &spec.name)) {
                    tracing::debug!("Node {} restored from checkpoint", spec.name);
                    outcomes.push((node, outcome));
                } else {
                    dispatch.push((node, node_input));
                }
            }

            outcomes.extend(self.dispatch(workflow, manager, ctx, cancellation, dispatch).await);
            outcomes.sort_by_key(|(node, _)| *node);

            for (node, outcome) in outcomes {
                if let Some(fatal) = state.apply(node, outcome) {
                    failure.get_or_insert(fatal);
                }
            }

            self.save_checkpoint(workflow, ctx, &state).await;

            if failure.is_some() {
                break;
            }
            if state.terminal {
                tracing::debug!("Terminal response produced in wave {}", wave);
                break;
            }
        }

        let status = match (&failure, state.continued.is_empty()) {
            (Some(_), _) => RunStatus::Failed,
            (None, false) => RunStatus::Partial,
            (None, true) => RunStatus::Succeeded,
        };
        let (failed_node, error) = match failure {
            Some((node, error)) => (node, Some(error)),
            None => (None, None),
        };

        RunResult {
            status,
            completed_node_names: state.completed,
            failed_node,
            error,
            response: state.response,
            warnings: state.warnings,
        }
    }

    /// Run one wave's nodes on the bounded pool.
    async fn dispatch(
        &self,
        workflow: &WorkflowDefinition,
        manager: &ErrorManager,
        ctx: &ExecutionContext,
        cancellation: &CancellationToken,
        nodes: Vec<(usize, Json)>,
    ) -> Vec<(usize, StepOutcome)> {
        let mut queue = nodes.into_iter();
        let mut running = FuturesUnordered::new();
        let mut outcomes = Vec::new();
        let mut aborted = false;

        loop {
            while !aborted && running.len() < self.max_parallel {
                let Some((node, input)) = queue.next() else {
                    break;
                };
                let manager = manager.clone();
                let spec = workflow.nodes[node].clone();
                let ctx = ctx.clone();
                let cancellation = cancellation.clone();
                let handle = tokio::spawn(async move {
                    manager.run(&spec, &input, &ctx, &cancellation).await
                });
                running.push(async move { (node, handle.await) });
            }

            let Some((node, joined)) = running.next().await else {
                break;
            };
            let outcome = joined.unwrap_or_else(|e| StepOutcome::Failed {
                error: format!("Task join error: {}", e),
            });
            if matches!(outcome, StepOutcome::Failed { .. } | StepOutcome::Cancelled) {
                aborted = true;
            }
            outcomes.push((node, outcome));
        }

        outcomes
    }

    async fn load_checkpoint(&self, ctx: &ExecutionContext) -> Option<Checkpoint> {
        let persistence = self.persistence.as_ref()?;
        match persistence.load(ctx.run_id()).await {
            Ok(Some(checkpoint)) => {
                tracing::info!(
                    "Resuming run {} from checkpoint with {} recorded steps",
                    ctx.run_id(),
                    checkpoint.steps.len()
                );
                Some(checkpoint)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Could not load checkpoint for run {}: {}", ctx.run_id(), e);
                None
            }
        }
    }

    async fn save_checkpoint(
        &self,
        workflow: &WorkflowDefinition,
        ctx: &ExecutionContext,
        state: &RunState<'_>,
    ) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        let checkpoint = Checkpoint {
            workflow_id: workflow.id.clone(),
            steps: ctx.steps().snapshot(),
            continued: state.continued.clone(),
            saved_at: Utc::now(),
        };
        if let Err(e) = persistence.save(ctx.run_id(), &checkpoint).await {
            tracing::warn!("Could not save checkpoint for run {}: {}", ctx.run_id(), e);
        }
    }
}

/// Rebuild a node's outcome from a checkpoint and put its output back into
/// `$steps`.
fn replayed(checkpoint: &Checkpoint, ctx: &ExecutionContext, node: &str) -> Option<StepOutcome> {
    let record = checkpoint.steps.get(node)?;
    if let Err(e) = ctx.steps().record(node, record.clone()) {
        tracing::warn!("Could not restore {}: {}", node, e);
    }
    if let Some(error) = checkpoint.continued.get(node) {
        return Some(StepOutcome::Continued {
            error: error.clone(),
        });
    }
    let StepRecord {
        output,
        branch,
        terminal,
        ..
    } = record.clone();
    Some(StepOutcome::Completed(HandlerOutput {
        output,
        branch_index: Some(branch),
        terminal,
    }))
}
