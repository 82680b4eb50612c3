//! Structural and semantic checks over a raw workflow document.
//!
//! The validator works on untyped JSON so that a document too broken to
//! deserialize still gets a full report. Every rule runs on every call; the
//! report is never cut short by an earlier failure.
//!
//! Each rule lives in its own file under `rules/` and implements
//! [`ValidationRule`]. [`Validator::new`] wires the built-in set.

pub mod rules;

use serde::Serialize;
use serde_json::{Map, Value as Json};
use std::collections::HashSet;
use std::fmt;

/// Severity of a validation issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueKind {
    Error,
    Warning,
}

/// One finding: `{kind, field, message}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub kind: IssueKind,
    /// Dotted path into the document, e.g. `nodes[2].parameters.url`.
    pub field: String,
    pub message: String,
    /// Rule that produced the issue
    #[serde(skip)]
    pub rule: &'static str,
}

impl Issue {
    pub fn error(field: impl Into<String>, message: impl Into<String>, rule: &'static str) -> Self {
        Self {
            kind: IssueKind::Error,
            field: field.into(),
            message: message.into(),
            rule,
        }
    }

    pub fn warning(
        field: impl Into<String>,
        message: impl Into<String>,
        rule: &'static str,
    ) -> Self {
        Self {
            kind: IssueKind::Warning,
            field: field.into(),
            message: message.into(),
            rule,
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == IssueKind::Error
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            IssueKind::Error => "error",
            IssueKind::Warning => "warning",
        };
        if self.field.is_empty() {
            write!(f, "{}: {}", kind, self.message)
        } else {
            write!(f, "{} at {}: {}", kind, self.field, self.message)
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationOptions {
    /// Warnings fail the report as well.
    pub strict: bool,
    /// Documents must carry a `tenantId`.
    pub tenant_mode: bool,
}

impl ValidationOptions {
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    pub fn with_tenant_mode(mut self, tenant_mode: bool) -> Self {
        self.tenant_mode = tenant_mode;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub ok: bool,
    pub issues: Vec<Issue>,
}

impl ValidationReport {
    pub fn new(issues: Vec<Issue>, strict: bool) -> Self {
        let ok = !issues
            .iter()
            .any(|issue| issue.is_error() || (strict && issue.kind == IssueKind::Warning));
        Self { ok, issues }
    }

    pub fn errors(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.kind == IssueKind::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.kind == IssueKind::Warning)
    }

    /// Issues reported at exactly `field`.
    pub fn at<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a Issue> + 'a {
        self.issues.iter().filter(move |i| i.field == field)
    }

    /// Fold in issues found by a later pass, e.g. graph analysis.
    pub fn extend(&mut self, issues: impl IntoIterator<Item = Issue>, strict: bool) {
        self.issues.extend(issues);
        *self = Self::new(std::mem::take(&mut self.issues), strict);
    }
}

/// Knows which operation types a host can dispatch.
pub trait TypeCatalog {
    fn knows(&self, op_type: &str) -> bool;
}

/// What a rule gets to look at.
pub struct Document<'a> {
    pub root: &'a Map<String, Json>,
    /// `nodes` entries that are objects, with their index.
    pub nodes: Vec<(usize, &'a Map<String, Json>)>,
    pub node_names: HashSet<&'a str>,
    pub node_ids: HashSet<&'a str>,
    pub options: ValidationOptions,
    pub catalog: Option<&'a dyn TypeCatalog>,
}

impl<'a> Document<'a> {
    fn new(
        root: &'a Map<String, Json>,
        options: ValidationOptions,
        catalog: Option<&'a dyn TypeCatalog>,
    ) -> Self {
        let nodes: Vec<(usize, &'a Map<String, Json>)> = root
            .get("nodes")
            .and_then(Json::as_array)
            .map(|items| {
                items
                    .iter()
                    .enumerate()
                    .filter_map(|(i, node)| node.as_object().map(|n| (i, n)))
                    .collect()
            })
            .unwrap_or_default();
        let node_names = nodes
            .iter()
            .filter_map(|(_, n)| n.get("name").and_then(Json::as_str))
            .collect();
        let node_ids = nodes
            .iter()
            .filter_map(|(_, n)| n.get("id").and_then(Json::as_str))
            .collect();
        Self {
            root,
            nodes,
            node_names,
            node_ids,
            options,
            catalog,
        }
    }
}

/// Trait every validation rule implements.
pub trait ValidationRule: Send + Sync {
    /// Unique identifier, e.g. `"node-fields"`.
    fn id(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn check(&self, document: &Document<'_>) -> Vec<Issue>;
}

/// Runs every registered rule over a document.
pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(rules::RequiredFieldsRule),
                Box::new(rules::NodeFieldsRule),
                Box::new(rules::UniqueNodesRule),
                Box::new(rules::ParameterRule),
                Box::new(rules::ConnectionRule),
                Box::new(rules::OperationTypeRule),
                Box::new(rules::VariableRule),
                Box::new(rules::TriggerRule),
                Box::new(rules::SettingsRule),
                Box::new(rules::TenantRule),
            ],
        }
    }

    pub fn validate(
        &self,
        document: &Json,
        options: ValidationOptions,
        catalog: Option<&dyn TypeCatalog>,
    ) -> ValidationReport {
        let Some(root) = document.as_object() else {
            return ValidationReport::new(
                vec![Issue::error("", "document must be a JSON object", "document")],
                options.strict,
            );
        };
        let document = Document::new(root, options, catalog);
        let issues: Vec<Issue> = self
            .rules
            .iter()
            .flat_map(|rule| rule.check(&document))
            .collect();
        tracing::debug!(
            "Validated document with {} rules: {} issue(s)",
            self.rules.len(),
            issues.len()
        );
        ValidationReport::new(issues, options.strict)
    }

    pub fn rules(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.rules.iter().map(|r| (r.id(), r.description()))
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate a document with the built-in rules and no type catalog.
pub fn validate(document: &Json, options: ValidationOptions) -> ValidationReport {
    Validator::new().validate(document, options, None)
}

/// Append `.key` to a path.
pub(crate) fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub(crate) fn is_index(value: &Json) -> bool {
    value.as_u64().is_some()
}
