//! Rule: Node Fields
//!
//! Every node needs `id`, `name`, `type` and `typeVersion`. Each missing
//! property is reported exactly once per node. `typeVersion` must be an
//! integer of at least 1, `onError` one of the three policies. A malformed
//! `position` is cosmetic and only a warning.

use crate::validation::{is_index, join, Document, Issue, ValidationRule};
use serde_json::{Map, Value as Json};

pub struct NodeFieldsRule;

impl ValidationRule for NodeFieldsRule {
    fn id(&self) -> &'static str {
        "node-fields"
    }

    fn description(&self) -> &'static str {
        "Nodes carry id, name, type and typeVersion"
    }

    fn check(&self, document: &Document<'_>) -> Vec<Issue> {
        let Some(nodes) = document.root.get("nodes").and_then(Json::as_array) else {
            return Vec::new();
        };
        let mut issues = Vec::new();
        for (i, node) in nodes.iter().enumerate() {
            let path = format!("nodes[{}]", i);
            match node.as_object() {
                Some(node) => self.check_node(&path, node, &mut issues),
                None => issues.push(Issue::error(path, "node must be an object", self.id())),
            }
        }
        issues
    }
}

impl NodeFieldsRule {
    fn check_node(&self, path: &str, node: &Map<String, Json>, issues: &mut Vec<Issue>) {
        for field in ["id", "name", "type"] {
            let field_path = join(path, field);
            match node.get(field) {
                None => issues.push(Issue::error(
                    field_path,
                    format!("missing required property '{}'", field),
                    self.id(),
                )),
                Some(Json::String(s)) if s.trim().is_empty() => {
                    issues.push(Issue::error(field_path, "must not be empty", self.id()))
                }
                Some(Json::String(_)) => {}
                Some(_) => issues.push(Issue::error(field_path, "must be a string", self.id())),
            }
        }

        let version_path = join(path, "typeVersion");
        match node.get("typeVersion") {
            None => issues.push(Issue::error(
                version_path,
                "missing required property 'typeVersion'",
                self.id(),
            )),
            Some(v) if v.as_u64().map_or(true, |n| n < 1) => issues.push(Issue::error(
                version_path,
                "typeVersion must be an integer >= 1",
                self.id(),
            )),
            Some(_) => {}
        }

        if let Some(position) = node.get("position") {
            let well_formed = position
                .as_array()
                .map_or(false, |xy| xy.len() == 2 && xy.iter().all(Json::is_number));
            if !well_formed {
                issues.push(Issue::warning(
                    join(path, "position"),
                    "position should be [x, y] numbers",
                    self.id(),
                ));
            }
        }

        if matches!(node.get("disabled"), Some(v) if !v.is_boolean()) {
            issues.push(Issue::error(join(path, "disabled"), "must be a boolean", self.id()));
        }

        if let Some(policy) = node.get("onError") {
            self.check_on_error(&join(path, "onError"), policy, issues);
        }
    }

    fn check_on_error(&self, path: &str, policy: &Json, issues: &mut Vec<Issue>) {
        const EXPECTED: &str =
            "onError must be \"continue\", \"stop\" or {\"retry\": {\"maxRetries\", \"retryDelayMs\"}}";
        match policy {
            Json::String(s) if s == "continue" || s == "stop" => {}
            Json::Object(map) if map.len() == 1 && map.contains_key("retry") => {
                let Some(retry) = map.get("retry").and_then(Json::as_object) else {
                    issues.push(Issue::error(path, EXPECTED, self.id()));
                    return;
                };
                let retry_path = join(path, "retry");
                for field in ["maxRetries", "retryDelayMs"] {
                    if !retry.get(field).map_or(false, is_index) {
                        issues.push(Issue::error(
                            join(&retry_path, field),
                            "must be a non-negative integer",
                            self.id(),
                        ));
                    }
                }
                if let Some(multiplier) = retry.get("backoffMultiplier") {
                    if !multiplier.as_f64().map_or(false, |m| m >= 1.0) {
                        issues.push(Issue::error(
                            join(&retry_path, "backoffMultiplier"),
                            "must be a number >= 1",
                            self.id(),
                        ));
                    }
                }
            }
            _ => issues.push(Issue::error(path, EXPECTED, self.id())),
        }
    }
}
