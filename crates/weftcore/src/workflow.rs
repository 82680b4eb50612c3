use crate::{ParameterValue, WorkflowError};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as Json};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// `sourceNodeName -> port -> outputIndex -> targets`
pub type Connections = BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<ConnectionTarget>>>>;

/// Complete workflow definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, Variable>,
    pub nodes: Vec<NodeSpec>,
    pub connections: Connections,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<TriggerSpec>,
    #[serde(default)]
    pub static_data: Map<String, Json>,
    #[serde(default)]
    pub settings: WorkflowSettings,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            active: true,
            version_id: None,
            tenant_id: None,
            tags: BTreeSet::new(),
            variables: BTreeMap::new(),
            nodes: Vec::new(),
            connections: Connections::new(),
            triggers: Vec::new(),
            static_data: Map::new(),
            settings: WorkflowSettings::default(),
        }
    }

    /// Parse a workflow document, filling in variable names from their keys.
    pub fn from_json(document: Json) -> Result<Self, WorkflowError> {
        let mut workflow: WorkflowDefinition = serde_json::from_value(document)
            .map_err(|e| WorkflowError::Invalid(e.to_string()))?;
        for (name, variable) in workflow.variables.iter_mut() {
            variable.name = name.clone();
        }
        Ok(workflow)
    }

    /// Just the graph of a document that may not parse as a whole: node
    /// names and types, connections and the triggers that parse.
    ///
    /// `None` unless every node has a string `name` and `connections` has
    /// the adjacency shape.
    pub fn graph_of(document: &Json) -> Option<Self> {
        let mut workflow = Self::new(document.get("name").and_then(Json::as_str).unwrap_or(""));
        if let Some(id) = document.get("id").and_then(Json::as_str) {
            workflow.id = id.to_string();
        }

        for node in document.get("nodes")?.as_array()? {
            let name = node.get("name")?.as_str()?;
            let op_type = node.get("type").and_then(Json::as_str).unwrap_or("");
            let mut spec = NodeSpec::new(name, op_type);
            if let Some(id) = node.get("id").and_then(Json::as_str) {
                spec.id = id.to_string();
            }
            workflow.nodes.push(spec);
        }

        workflow.connections = serde_json::from_value(document.get("connections")?.clone()).ok()?;
        workflow.triggers = document
            .get("triggers")
            .and_then(Json::as_array)
            .map(|triggers| {
                triggers
                    .iter()
                    .filter_map(|t| serde_json::from_value(t.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();
        Some(workflow)
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn add_node(&mut self, node: NodeSpec) -> String {
        let name = node.name.clone();
        self.nodes.push(node);
        name
    }

    pub fn add_variable(&mut self, variable: Variable) {
        self.variables.insert(variable.name.clone(), variable);
    }

    /// Connect `from`'s main output 0 to `to`.
    pub fn connect(&mut self, from: &str, to: &str) {
        self.connect_port(from, Port::Main, 0, to);
    }

    /// Connect one of `from`'s branch outputs to `to`.
    pub fn connect_branch(&mut self, from: &str, index: usize, to: &str) {
        self.connect_port(from, Port::Main, index, to);
    }

    pub fn connect_port(&mut self, from: &str, port: Port, index: usize, to: &str) {
        self.connections
            .entry(from.to_string())
            .or_default()
            .entry(port.as_str().to_string())
            .or_default()
            .entry(index.to_string())
            .or_default()
            .push(ConnectionTarget::main(to));
    }

    pub fn find_node(&self, name: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Every well-formed edge, sorted by source name.
    ///
    /// Edges on unknown ports or non-numeric indices are left out; the
    /// validator reports them.
    pub fn edges(&self) -> Vec<Edge> {
        let mut edges = Vec::new();
        for (source, ports) in &self.connections {
            for (port_name, outputs) in ports {
                let Some(port) = Port::parse(port_name) else {
                    continue;
                };
                for (index, targets) in outputs {
                    let Ok(output) = index.parse::<usize>() else {
                        continue;
                    };
                    for target in targets {
                        edges.push(Edge {
                            source: source.clone(),
                            port,
                            output,
                            target: target.node.clone(),
                        });
                    }
                }
            }
        }
        edges
    }
}

/// Output port of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Port {
    Main,
    Error,
}

impl Port {
    pub const NAMES: [&'static str; 2] = ["main", "error"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Port::Main => "main",
            Port::Error => "error",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "main" => Some(Port::Main),
            "error" => Some(Port::Error),
            _ => None,
        }
    }
}

/// One entry in a connection target list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionTarget {
    pub node: String,
    #[serde(rename = "type", default = "default_input_type")]
    pub input_type: String,
    #[serde(default)]
    pub index: usize,
}

fn default_input_type() -> String {
    "main".to_string()
}

impl ConnectionTarget {
    pub fn main(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            input_type: default_input_type(),
            index: 0,
        }
    }
}

/// A flattened connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub source: String,
    pub port: Port,
    pub output: usize,
    pub target: String,
}

/// Node specification in a workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub op_type: String,
    #[serde(default = "default_type_version")]
    pub type_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<[f64; 2]>,
    #[serde(default)]
    pub parameters: Map<String, Json>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub on_error: OnError,
}

fn default_type_version() -> u32 {
    1
}

impl NodeSpec {
    pub fn new(name: impl Into<String>, op_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            op_type: op_type.into(),
            type_version: 1,
            position: None,
            parameters: Map::new(),
            disabled: false,
            on_error: OnError::Stop,
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: ParameterValue) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Set a parameter to a template or structured JSON value.
    pub fn with_expression(mut self, key: impl Into<String>, value: impl Into<Json>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Some([x, y]);
        self
    }

    pub fn with_on_error(mut self, policy: OnError) -> Self {
        self.on_error = policy;
        self
    }

    pub fn with_retry(self, max_retries: u32, retry_delay_ms: u64) -> Self {
        self.with_on_error(OnError::Retry(RetryPolicy {
            max_retries,
            retry_delay_ms,
            backoff_multiplier: None,
        }))
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }
}

/// What happens when a node's handler fails.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum OnError {
    Continue,
    Retry(RetryPolicy),
    #[default]
    Stop,
}

/// Retry policy for node execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_multiplier: Option<f64>,
}

/// Declared workflow variable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    #[serde(default, skip_serializing)]
    pub name: String,
    #[serde(rename = "type")]
    pub var_type: VariableType,
    #[serde(default)]
    pub description: String,
    #[serde(
        default,
        deserialize_with = "default_value_as_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub default_value: Option<String>,
    #[serde(default)]
    pub required: bool,
}

impl Variable {
    pub fn new(name: impl Into<String>, var_type: VariableType) -> Self {
        Self {
            name: name.into(),
            var_type,
            description: String::new(),
            default_value: None,
            required: false,
        }
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Default values are kept as strings; non-string JSON is stored in its
/// serialized form and coerced at resolution time like any other default.
fn default_value_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Json>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Json::Null) => None,
        Some(Json::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    String,
    Number,
    Boolean,
    Array,
    Object,
    Date,
    Any,
}

impl VariableType {
    pub const NAMES: [&'static str; 7] =
        ["string", "number", "boolean", "array", "object", "date", "any"];

    pub fn as_str(&self) -> &'static str {
        match self {
            VariableType::String => "string",
            VariableType::Number => "number",
            VariableType::Boolean => "boolean",
            VariableType::Array => "array",
            VariableType::Object => "object",
            VariableType::Date => "date",
            VariableType::Any => "any",
        }
    }
}

/// Workflow trigger specification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSpec {
    pub node_id: String,
    pub kind: TriggerKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Json>>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Webhook,
    Schedule,
    Queue,
    Email,
    Poll,
    Manual,
    Other,
}

impl TriggerKind {
    pub const NAMES: [&'static str; 7] =
        ["webhook", "schedule", "queue", "email", "poll", "manual", "other"];
}

/// Global workflow settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel_nodes: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_timeout_ms: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Json>,
}
