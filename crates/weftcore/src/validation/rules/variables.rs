//! Rule: Variables
//!
//! `variables` maps names to declarations. Names must be identifiers
//! (`[A-Za-z_][A-Za-z0-9_]*`) and each declaration needs a `type` from the
//! closed set.

use crate::validation::{is_identifier, join, Document, Issue, ValidationRule};
use crate::VariableType;
use serde_json::Value as Json;

pub struct VariableRule;

impl ValidationRule for VariableRule {
    fn id(&self) -> &'static str {
        "variables"
    }

    fn description(&self) -> &'static str {
        "Variables have identifier names and a known type"
    }

    fn check(&self, document: &Document<'_>) -> Vec<Issue> {
        let variables = match document.root.get("variables") {
            None | Some(Json::Null) => return Vec::new(),
            Some(Json::Object(map)) => map,
            Some(_) => {
                return vec![Issue::error("variables", "must be an object", self.id())];
            }
        };

        let mut issues = Vec::new();
        for (name, declaration) in variables {
            let path = join("variables", name);
            if !is_identifier(name) {
                issues.push(Issue::error(
                    path.clone(),
                    format!("variable name '{}' is not a valid identifier", name),
                    self.id(),
                ));
            }
            let Some(declaration) = declaration.as_object() else {
                issues.push(Issue::error(path, "declaration must be an object", self.id()));
                continue;
            };
            match declaration.get("type") {
                None => issues.push(Issue::error(
                    join(&path, "type"),
                    "missing required property 'type'",
                    self.id(),
                )),
                Some(Json::String(t)) if VariableType::NAMES.contains(&t.as_str()) => {}
                Some(other) => issues.push(Issue::error(
                    join(&path, "type"),
                    format!(
                        "unknown variable type {} (expected one of {})",
                        other,
                        VariableType::NAMES.join(", ")
                    ),
                    self.id(),
                )),
            }
            if matches!(declaration.get("required"), Some(v) if !v.is_boolean()) {
                issues.push(Issue::error(join(&path, "required"), "must be a boolean", self.id()));
            }
            if matches!(declaration.get("description"), Some(v) if !v.is_string()) {
                issues.push(Issue::warning(
                    join(&path, "description"),
                    "should be a string",
                    self.id(),
                ));
            }
        }
        issues
    }
}
