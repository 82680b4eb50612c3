//! Rule: Parameters
//!
//! Catches two serialization bugs in node parameters:
//!
//! - node-level attributes (`name`, `typeVersion`, `position`) showing up
//!   inside `parameters`, which means a whole node was nested into its own
//!   parameter map; reported once per node
//! - the string `"[object Object]"`, at any depth

use crate::validation::{join, Document, Issue, ValidationRule};
use serde_json::Value as Json;

pub const RESERVED_PARAMETER_KEYS: [&str; 3] = ["name", "typeVersion", "position"];

pub const SERIALIZATION_FAILURE: &str = "[object Object]";

pub struct ParameterRule;

impl ValidationRule for ParameterRule {
    fn id(&self) -> &'static str {
        "parameters"
    }

    fn description(&self) -> &'static str {
        "Parameters are not nested nodes or failed serializations"
    }

    fn check(&self, document: &Document<'_>) -> Vec<Issue> {
        let mut issues = Vec::new();
        for (i, node) in &document.nodes {
            let path = format!("nodes[{}].parameters", i);
            let parameters = match node.get("parameters") {
                None | Some(Json::Null) => continue,
                Some(Json::Object(map)) => map,
                Some(_) => {
                    issues.push(Issue::error(path, "must be an object", self.id()));
                    continue;
                }
            };

            let reserved: Vec<&str> = RESERVED_PARAMETER_KEYS
                .into_iter()
                .filter(|key| parameters.contains_key(*key))
                .collect();
            if !reserved.is_empty() {
                issues.push(Issue::error(
                    path.clone(),
                    format!(
                        "parameters contain node-level attribute(s) {}; the node looks nested inside its own parameters",
                        reserved.join(", ")
                    ),
                    self.id(),
                ));
            }

            for (key, value) in parameters {
                self.scan(&join(&path, key), value, &mut issues);
            }
        }
        issues
    }
}

impl ParameterRule {
    fn scan(&self, path: &str, value: &Json, issues: &mut Vec<Issue>) {
        match value {
            Json::String(s) if s == SERIALIZATION_FAILURE => issues.push(Issue::error(
                path,
                "value is \"[object Object]\"; an object was serialized as a string",
                self.id(),
            )),
            Json::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    self.scan(&format!("{}[{}]", path, i), item, issues);
                }
            }
            Json::Object(map) => {
                for (key, item) in map {
                    self.scan(&join(path, key), item, issues);
                }
            }
            _ => {}
        }
    }
}
