//! Rule: Operation Type
//!
//! With a type catalog available, node types the host cannot dispatch are
//! reported as warnings. A differently configured host may still run them.

use crate::validation::{Document, Issue, ValidationRule};
use serde_json::Value as Json;

pub struct OperationTypeRule;

impl ValidationRule for OperationTypeRule {
    fn id(&self) -> &'static str {
        "operation-type"
    }

    fn description(&self) -> &'static str {
        "Node types are known to the registry"
    }

    fn check(&self, document: &Document<'_>) -> Vec<Issue> {
        let Some(catalog) = document.catalog else {
            return Vec::new();
        };
        document
            .nodes
            .iter()
            .filter_map(|(i, node)| {
                let op_type = node.get("type").and_then(Json::as_str)?;
                (!catalog.knows(op_type)).then(|| {
                    Issue::warning(
                        format!("nodes[{}].type", i),
                        format!("no handler registered for operation type '{}'", op_type),
                        self.id(),
                    )
                })
            })
            .collect()
    }
}
