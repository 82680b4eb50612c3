//! Rule: Settings
//!
//! Unknown settings are kept and ignored; the engine-level ones must be
//! positive integers.

use crate::validation::{join, Document, Issue, ValidationRule};
use serde_json::Value as Json;

pub struct SettingsRule;

impl ValidationRule for SettingsRule {
    fn id(&self) -> &'static str {
        "settings"
    }

    fn description(&self) -> &'static str {
        "Engine settings are well-formed"
    }

    fn check(&self, document: &Document<'_>) -> Vec<Issue> {
        let settings = match document.root.get("settings") {
            None | Some(Json::Null) => return Vec::new(),
            Some(Json::Object(map)) => map,
            Some(_) => return vec![Issue::error("settings", "must be an object", self.id())],
        };
        ["maxParallelNodes", "stepTimeoutMs"]
            .into_iter()
            .filter(|key| {
                settings
                    .get(*key)
                    .map_or(false, |v| v.as_u64().map_or(true, |n| n == 0))
            })
            .map(|key| Issue::error(join("settings", key), "must be a positive integer", self.id()))
            .collect()
    }
}
