//! Rule: Required Fields
//!
//! The document must carry `id`, `name`, `nodes` and `connections`, with
//! `nodes` an array and `connections` an object. `active` and `tags` are
//! optional but must have the right shape when present.

use crate::validation::{Document, Issue, ValidationRule};
use serde_json::Value as Json;

pub struct RequiredFieldsRule;

const REQUIRED: [&str; 4] = ["id", "name", "nodes", "connections"];

impl ValidationRule for RequiredFieldsRule {
    fn id(&self) -> &'static str {
        "required-fields"
    }

    fn description(&self) -> &'static str {
        "Top-level fields are present and well-formed"
    }

    fn check(&self, document: &Document<'_>) -> Vec<Issue> {
        let root = document.root;
        let mut issues = Vec::new();

        for field in REQUIRED {
            if !root.contains_key(field) {
                issues.push(Issue::error(
                    field,
                    format!("missing required property '{}'", field),
                    self.id(),
                ));
            }
        }

        for field in ["id", "name"] {
            if let Some(value) = root.get(field) {
                if !value.is_string() {
                    issues.push(Issue::error(field, "must be a string", self.id()));
                }
            }
        }
        if matches!(root.get("nodes"), Some(v) if !v.is_array()) {
            issues.push(Issue::error("nodes", "must be an array", self.id()));
        }
        if matches!(root.get("connections"), Some(v) if !v.is_object()) {
            issues.push(Issue::error("connections", "must be an object", self.id()));
        }
        if matches!(root.get("active"), Some(v) if !v.is_boolean()) {
            issues.push(Issue::error("active", "must be a boolean", self.id()));
        }
        match root.get("tags") {
            None | Some(Json::Null) => {}
            Some(Json::Array(tags)) => {
                for (i, tag) in tags.iter().enumerate() {
                    if !tag.is_string() {
                        issues.push(Issue::error(
                            format!("tags[{}]", i),
                            "tag must be a string",
                            self.id(),
                        ));
                    }
                }
            }
            Some(_) => issues.push(Issue::error("tags", "must be an array", self.id())),
        }

        issues
    }
}
