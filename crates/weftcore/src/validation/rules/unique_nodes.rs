//! Rule: Unique Nodes
//!
//! Node names key connections and `$steps`, so a repeated name is an error.
//! Ids are only stable references; a repeated id is a warning.

use crate::validation::{Document, Issue, ValidationRule};
use serde_json::Value as Json;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

pub struct UniqueNodesRule;

impl ValidationRule for UniqueNodesRule {
    fn id(&self) -> &'static str {
        "unique-nodes"
    }

    fn description(&self) -> &'static str {
        "Node names are unique; node ids should be"
    }

    fn check(&self, document: &Document<'_>) -> Vec<Issue> {
        let mut issues = Vec::new();
        let mut names: HashMap<&str, usize> = HashMap::new();
        let mut ids: HashMap<&str, usize> = HashMap::new();

        for (i, node) in &document.nodes {
            if let Some(name) = node.get("name").and_then(Json::as_str) {
                match names.entry(name) {
                    Entry::Occupied(first) => issues.push(Issue::error(
                        format!("nodes[{}].name", i),
                        format!(
                            "duplicate node name '{}' (first used by nodes[{}])",
                            name,
                            first.get()
                        ),
                        self.id(),
                    )),
                    Entry::Vacant(slot) => {
                        slot.insert(*i);
                    }
                }
            }
            if let Some(id) = node.get("id").and_then(Json::as_str) {
                match ids.entry(id) {
                    Entry::Occupied(first) => issues.push(Issue::warning(
                        format!("nodes[{}].id", i),
                        format!("duplicate node id '{}' (first used by nodes[{}])", id, first.get()),
                        self.id(),
                    )),
                    Entry::Vacant(slot) => {
                        slot.insert(*i);
                    }
                }
            }
        }
        issues
    }
}
