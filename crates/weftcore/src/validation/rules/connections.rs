//! Rule: Connections
//!
//! Walks `source -> port -> index -> [targets]`. A dangling source or
//! target name is a warning (the host may patch the document before running
//! it); a port other than `main`/`error`, a non-numeric index or a malformed
//! target entry is an error.

use crate::validation::{is_index, join, Document, Issue, ValidationRule};
use crate::Port;
use serde_json::{Map, Value as Json};

pub struct ConnectionRule;

impl ValidationRule for ConnectionRule {
    fn id(&self) -> &'static str {
        "connections"
    }

    fn description(&self) -> &'static str {
        "Connections reference known nodes on declared ports"
    }

    fn check(&self, document: &Document<'_>) -> Vec<Issue> {
        let Some(connections) = document.root.get("connections").and_then(Json::as_object) else {
            return Vec::new();
        };
        let mut issues = Vec::new();
        for (source, ports) in connections {
            let path = join("connections", source);
            if !document.node_names.contains(source.as_str()) {
                issues.push(Issue::warning(
                    path.clone(),
                    format!("source node '{}' does not exist", source),
                    self.id(),
                ));
            }
            match ports.as_object() {
                Some(ports) => self.check_ports(document, &path, ports, &mut issues),
                None => issues.push(Issue::error(path, "must be an object of ports", self.id())),
            }
        }
        issues
    }
}

impl ConnectionRule {
    fn check_ports(
        &self,
        document: &Document<'_>,
        path: &str,
        ports: &Map<String, Json>,
        issues: &mut Vec<Issue>,
    ) {
        for (port, outputs) in ports {
            let port_path = join(path, port);
            if Port::parse(port).is_none() {
                issues.push(Issue::error(
                    port_path.clone(),
                    format!(
                        "unknown output port '{}' (expected one of {})",
                        port,
                        Port::NAMES.join(", ")
                    ),
                    self.id(),
                ));
            }
            let Some(outputs) = outputs.as_object() else {
                issues.push(Issue::error(
                    port_path,
                    "must be an object of output indices",
                    self.id(),
                ));
                continue;
            };
            for (index, targets) in outputs {
                let index_path = join(&port_path, index);
                if index.parse::<usize>().is_err() {
                    issues.push(Issue::error(
                        index_path.clone(),
                        format!("output index '{}' is not a non-negative integer", index),
                        self.id(),
                    ));
                }
                match targets.as_array() {
                    Some(targets) => {
                        for (k, target) in targets.iter().enumerate() {
                            let target_path = format!("{}[{}]", index_path, k);
                            self.check_target(document, &target_path, target, issues);
                        }
                    }
                    None => issues.push(Issue::error(
                        index_path,
                        "must be an array of targets",
                        self.id(),
                    )),
                }
            }
        }
    }

    fn check_target(
        &self,
        document: &Document<'_>,
        path: &str,
        target: &Json,
        issues: &mut Vec<Issue>,
    ) {
        let Some(target) = target.as_object() else {
            issues.push(Issue::error(path, "target must be an object", self.id()));
            return;
        };
        match target.get("node").and_then(Json::as_str) {
            Some(node) if !document.node_names.contains(node) => issues.push(Issue::warning(
                join(path, "node"),
                format!("target node '{}' does not exist", node),
                self.id(),
            )),
            Some(_) => {}
            None => issues.push(Issue::error(
                join(path, "node"),
                "target needs a string 'node'",
                self.id(),
            )),
        }
        if matches!(target.get("type"), Some(v) if !v.is_string()) {
            issues.push(Issue::error(join(path, "type"), "must be a string", self.id()));
        }
        if matches!(target.get("index"), Some(v) if !is_index(v)) {
            issues.push(Issue::error(
                join(path, "index"),
                "must be a non-negative integer",
                self.id(),
            ));
        }
    }
}
