// crates/weftruntime/tests/common/mod.rs

#![allow(dead_code)]

use serde_json::{json, Map, Value as Json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use weftcore::{HandlerError, HandlerOutput};
use weftruntime::{Engine, OperationRegistry, RuntimeConfig};

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

pub fn node(name: &str, op_type: &str) -> Json {
    json!({
        "id": format!("id-{}", name),
        "name": name,
        "type": op_type,
        "typeVersion": 1,
        "position": [0, 0],
        "parameters": {}
    })
}

pub fn node_with(name: &str, op_type: &str, parameters: Json) -> Json {
    let mut node = node(name, op_type);
    node["parameters"] = parameters;
    node
}

/// `(source, port, output index, target)` links into a connections object.
pub fn connections(links: &[(&str, &str, usize, &str)]) -> Json {
    let mut root = Map::new();
    for (source, port, index, target) in links {
        let ports = root
            .entry(source.to_string())
            .or_insert_with(|| json!({}));
        let outputs = ports[*port].take();
        let mut outputs = match outputs {
            Json::Object(map) => map,
            _ => Map::new(),
        };
        let list = outputs
            .entry(index.to_string())
            .or_insert_with(|| json!([]));
        if let Json::Array(targets) = list {
            targets.push(json!({ "node": target, "type": "main", "index": 0 }));
        }
        ports[*port] = Json::Object(outputs);
    }
    Json::Object(root)
}

/// Main-port links only.
pub fn chain(links: &[(&str, &str)]) -> Json {
    let links: Vec<(&str, &str, usize, &str)> =
        links.iter().map(|(s, t)| (*s, "main", 0, *t)).collect();
    connections(&links)
}

pub fn workflow(nodes: Vec<Json>, connections: Json) -> Json {
    json!({
        "id": "wf-test",
        "name": "test workflow",
        "active": true,
        "versionId": "v1",
        "tenantId": "acme",
        "tags": [],
        "variables": {},
        "nodes": nodes,
        "connections": connections,
        "staticData": {},
        "settings": {}
    })
}

/// Registry with a handful of test operations:
/// `test.echo` returns `$json`, `test.param` returns its `value` parameter,
/// `test.fail` always fails, `test.branch` follows its `index` parameter.
pub fn registry() -> OperationRegistry {
    let mut registry = OperationRegistry::new();
    registry.register_fn("test.echo", |ctx| async move { Ok(HandlerOutput::new(ctx.input)) });
    registry.register_fn("test.param", |ctx| async move {
        Ok(HandlerOutput::new(
            ctx.parameters.get("value").cloned().unwrap_or(Json::Null),
        ))
    });
    registry.register_fn("test.fail", |_ctx| async move {
        Err::<HandlerOutput, _>(HandlerError::Failed("boom".to_string()))
    });
    registry.register_fn("test.branch", |ctx| async move {
        let index = ctx.parameters.get_f64("index").unwrap_or(0.0) as usize;
        Ok(HandlerOutput::branch(ctx.input, index))
    });
    registry.register_fn("test.respond", |ctx| async move {
        Ok(HandlerOutput::respond(ctx.input))
    });
    registry
}

pub fn engine(registry: OperationRegistry) -> Engine {
    Engine::with_registry(Arc::new(registry), RuntimeConfig::default())
}

/// Counts invocations and fails the first `failures` of them.
#[derive(Clone, Default)]
pub struct Flaky {
    pub calls: Arc<AtomicUsize>,
}

impl Flaky {
    pub fn register(&self, registry: &mut OperationRegistry, op_type: &str, failures: usize) {
        let calls = self.calls.clone();
        registry.register_fn(op_type, move |ctx| {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < failures {
                    Err(HandlerError::Transient(format!("attempt {} failed", ctx.attempt)))
                } else {
                    Ok(HandlerOutput::new(json!({ "attempt": ctx.attempt })))
                }
            }
        });
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Records the `$json` each invocation received.
#[derive(Clone, Default)]
pub struct Recorder {
    pub inputs: Arc<Mutex<Vec<Json>>>,
}

impl Recorder {
    pub fn register(&self, registry: &mut OperationRegistry, op_type: &str) {
        let inputs = self.inputs.clone();
        registry.register_fn(op_type, move |ctx| {
            let inputs = inputs.clone();
            async move {
                inputs.lock().unwrap().push(ctx.input.clone());
                Ok(HandlerOutput::new(ctx.input))
            }
        });
    }

    pub fn inputs(&self) -> Vec<Json> {
        self.inputs.lock().unwrap().clone()
    }
}
