//! Rule: Triggers
//!
//! Optional `triggers` entries need a `nodeId` and a known `kind`. A
//! `nodeId` matching neither a node id nor a node name is a warning.

use crate::validation::{join, Document, Issue, ValidationRule};
use crate::TriggerKind;
use serde_json::Value as Json;

pub struct TriggerRule;

impl ValidationRule for TriggerRule {
    fn id(&self) -> &'static str {
        "triggers"
    }

    fn description(&self) -> &'static str {
        "Triggers point at existing nodes"
    }

    fn check(&self, document: &Document<'_>) -> Vec<Issue> {
        let triggers = match document.root.get("triggers") {
            None | Some(Json::Null) => return Vec::new(),
            Some(Json::Array(items)) => items,
            Some(_) => return vec![Issue::error("triggers", "must be an array", self.id())],
        };

        let mut issues = Vec::new();
        for (i, trigger) in triggers.iter().enumerate() {
            let path = format!("triggers[{}]", i);
            let Some(trigger) = trigger.as_object() else {
                issues.push(Issue::error(path, "trigger must be an object", self.id()));
                continue;
            };
            match trigger.get("nodeId").and_then(Json::as_str) {
                None => issues.push(Issue::error(
                    join(&path, "nodeId"),
                    "trigger needs a string 'nodeId'",
                    self.id(),
                )),
                Some(node) => {
                    if !document.node_ids.contains(node) && !document.node_names.contains(node) {
                        issues.push(Issue::warning(
                            join(&path, "nodeId"),
                            format!("trigger node '{}' does not exist", node),
                            self.id(),
                        ));
                    }
                }
            }
            match trigger.get("kind").and_then(Json::as_str) {
                Some(kind) if TriggerKind::NAMES.contains(&kind) => {}
                _ => issues.push(Issue::error(
                    join(&path, "kind"),
                    format!("kind must be one of {}", TriggerKind::NAMES.join(", ")),
                    self.id(),
                )),
            }
            if matches!(trigger.get("enabled"), Some(v) if !v.is_boolean()) {
                issues.push(Issue::error(join(&path, "enabled"), "must be a boolean", self.id()));
            }
        }
        issues
    }
}
