use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use std::collections::HashMap;
use weftcore::{Issue, Port, TriggerKind, WorkflowDefinition, WorkflowError};

/// A connection between two existing nodes, by declaration index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEdge {
    pub source: usize,
    pub port: Port,
    pub output: usize,
    pub target: usize,
}

/// Non-fatal findings of the static graph pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphWarning {
    /// No incoming and no outgoing connections.
    Orphan { node: String },
    /// Not reachable from any start node; never runs.
    Unreachable { node: String },
    /// Connection naming a node that does not exist; ignored.
    DanglingEdge { source: String, target: String },
}

/// Static shape of a run: nodes, edges, start set and reachability.
///
/// Built once per run. Which edges actually carry data is decided while the
/// run progresses, since a branching node realizes only one of its outputs.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    names: Vec<String>,
    index: HashMap<String, usize>,
    edges: Vec<PlannedEdge>,
    incoming: Vec<Vec<usize>>,
    outgoing: Vec<Vec<usize>>,
    start: Vec<usize>,
    reachable: Vec<bool>,
    warnings: Vec<GraphWarning>,
}

impl ExecutionPlan {
    /// Build the plan, failing on duplicate names or a cycle.
    pub fn build(workflow: &WorkflowDefinition) -> Result<Self, WorkflowError> {
        let n = workflow.nodes.len();
        let mut index = HashMap::with_capacity(n);
        for (i, node) in workflow.nodes.iter().enumerate() {
            if index.insert(node.name.clone(), i).is_some() {
                return Err(WorkflowError::Invalid(format!(
                    "duplicate node name '{}'",
                    node.name
                )));
            }
        }

        let mut graph: DiGraph<usize, usize> = DiGraph::with_capacity(n, n);
        let indices: Vec<NodeIndex> = (0..n).map(|i| graph.add_node(i)).collect();
        let mut edges = Vec::new();
        let mut incoming = vec![Vec::new(); n];
        let mut outgoing = vec![Vec::new(); n];
        let mut warnings = Vec::new();

        for edge in workflow.edges() {
            match (index.get(&edge.source), index.get(&edge.target)) {
                (Some(&source), Some(&target)) => {
                    let id = edges.len();
                    edges.push(PlannedEdge {
                        source,
                        port: edge.port,
                        output: edge.output,
                        target,
                    });
                    graph.add_edge(indices[source], indices[target], id);
                    outgoing[source].push(id);
                    incoming[target].push(id);
                }
                _ => {
                    tracing::warn!(
                        "Ignoring connection {} -> {}: unknown node",
                        edge.source,
                        edge.target
                    );
                    warnings.push(GraphWarning::DanglingEdge {
                        source: edge.source,
                        target: edge.target,
                    });
                }
            }
        }

        if is_cyclic_directed(&graph) {
            let cycle = find_cycle(n, &edges, &outgoing).unwrap_or_default();
            let path = cycle.into_iter().map(|i| workflow.nodes[i].name.clone()).collect();
            return Err(WorkflowError::Cycle { path });
        }

        let start = start_nodes(workflow, &index, &incoming);

        let mut reachable = vec![false; n];
        for &s in &start {
            let mut bfs = Bfs::new(&graph, indices[s]);
            while let Some(nx) = bfs.next(&graph) {
                reachable[graph[nx]] = true;
            }
        }

        for (i, node) in workflow.nodes.iter().enumerate() {
            let orphan = n > 1 && incoming[i].is_empty() && outgoing[i].is_empty();
            if orphan {
                tracing::warn!("Node '{}' has no connections", node.name);
                warnings.push(GraphWarning::Orphan {
                    node: node.name.clone(),
                });
            } else if !reachable[i] {
                tracing::warn!("Node '{}' is unreachable from the start nodes", node.name);
                warnings.push(GraphWarning::Unreachable {
                    node: node.name.clone(),
                });
            }
        }

        tracing::debug!(
            "Planned {} nodes, {} edges, start set {:?}",
            n,
            edges.len(),
            start.iter().map(|&i| &workflow.nodes[i].name).collect::<Vec<_>>()
        );

        Ok(Self {
            names: workflow.nodes.iter().map(|n| n.name.clone()).collect(),
            index,
            edges,
            incoming,
            outgoing,
            start,
            reachable,
            warnings,
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, node: usize) -> &str {
        &self.names[node]
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn edges(&self) -> &[PlannedEdge] {
        &self.edges
    }

    pub fn edge(&self, id: usize) -> &PlannedEdge {
        &self.edges[id]
    }

    /// Edge ids entering `node`.
    pub fn incoming(&self, node: usize) -> &[usize] {
        &self.incoming[node]
    }

    /// Edge ids leaving `node`.
    pub fn outgoing(&self, node: usize) -> &[usize] {
        &self.outgoing[node]
    }

    pub fn has_port(&self, node: usize, port: Port) -> bool {
        self.outgoing[node]
            .iter()
            .any(|&e| self.edges[e].port == port)
    }

    pub fn start_nodes(&self) -> &[usize] {
        &self.start
    }

    pub fn is_start(&self, node: usize) -> bool {
        self.start.contains(&node)
    }

    pub fn is_reachable(&self, node: usize) -> bool {
        self.reachable[node]
    }

    pub fn warnings(&self) -> &[GraphWarning] {
        &self.warnings
    }

    /// Orphan and unreachable nodes as validation warnings.
    pub fn issues(&self) -> Vec<Issue> {
        self.warnings
            .iter()
            .filter_map(|warning| match warning {
                GraphWarning::Orphan { node } => Some(Issue::warning(
                    self.node_field(node),
                    format!("node '{}' has no connections", node),
                    "graph",
                )),
                GraphWarning::Unreachable { node } => Some(Issue::warning(
                    self.node_field(node),
                    format!("node '{}' is unreachable from the start nodes", node),
                    "graph",
                )),
                GraphWarning::DanglingEdge { .. } => None,
            })
            .collect()
    }

    fn node_field(&self, name: &str) -> String {
        self.index_of(name)
            .map(|i| format!("nodes[{}]", i))
            .unwrap_or_else(|| "nodes".to_string())
    }
}

/// The first enabled `manual` trigger's node, else the first enabled
/// trigger's node, else every node without incoming connections.
fn start_nodes(
    workflow: &WorkflowDefinition,
    index: &HashMap<String, usize>,
    incoming: &[Vec<usize>],
) -> Vec<usize> {
    let lookup = |reference: &str| {
        workflow
            .nodes
            .iter()
            .position(|n| n.id == reference)
            .or_else(|| index.get(reference).copied())
    };
    let enabled: Vec<_> = workflow.triggers.iter().filter(|t| t.enabled).collect();
    let triggered = enabled
        .iter()
        .filter(|t| t.kind == TriggerKind::Manual)
        .find_map(|t| lookup(&t.node_id))
        .or_else(|| enabled.iter().find_map(|t| lookup(&t.node_id)));

    match triggered {
        Some(node) => vec![node],
        None => (0..incoming.len())
            .filter(|&i| incoming[i].is_empty())
            .collect(),
    }
}

/// Depth-first search in declaration order; returns the first cycle found as
/// the node sequence starting at the node the back edge returns to.
fn find_cycle(n: usize, edges: &[PlannedEdge], outgoing: &[Vec<usize>]) -> Option<Vec<usize>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        New,
        OnPath,
        Done,
    }

    fn visit(
        node: usize,
        edges: &[PlannedEdge],
        outgoing: &[Vec<usize>],
        marks: &mut [Mark],
        path: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        marks[node] = Mark::OnPath;
        path.push(node);
        for &e in &outgoing[node] {
            let next = edges[e].target;
            match marks[next] {
                Mark::OnPath => {
                    let from = path.iter().position(|&p| p == next)?;
                    return Some(path[from..].to_vec());
                }
                Mark::New => {
                    if let Some(cycle) = visit(next, edges, outgoing, marks, path) {
                        return Some(cycle);
                    }
                }
                Mark::Done => {}
            }
        }
        path.pop();
        marks[node] = Mark::Done;
        None
    }

    let mut marks = vec![Mark::New; n];
    let mut path = Vec::new();
    for start in 0..n {
        if marks[start] == Mark::New {
            if let Some(cycle) = visit(start, edges, outgoing, &mut marks, &mut path) {
                return Some(cycle);
            }
        }
    }
    None
}
