// crates/weftcore/tests/context_test.rs

use serde_json::{json, Map};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use weftcore::expression::resolve;
use weftcore::{
    resolve_variables, ContextError, EventBus, ExecutionContext, ExecutionEvent, HandlerError,
    HostResource, NodeEvent, Parameters, RequestContext, StepRecord, Value, Variable,
    VariableType, WorkflowError,
};

fn context() -> ExecutionContext {
    let request = RequestContext::new("req-42")
        .with_tenant("acme")
        .with_user("ada");
    let mut config = Map::new();
    config.insert("region".to_string(), json!("eu-west"));
    ExecutionContext::new(request, config)
}

fn record(output: serde_json::Value) -> StepRecord {
    StepRecord::main(output, 0)
}

#[test]
fn test_typed_accessors_fall_back_to_default() {
    let ctx = context();
    let store = ctx.store();
    store.set("attempts", 3i64);
    store.set("label", "checkout");
    store.set("ratio", 0.5);
    store.set("enabled", true);

    assert_eq!(store.get_int("attempts", 0), 3);
    assert_eq!(store.get_string("label", ""), "checkout");
    assert_eq!(store.get_double("ratio", 1.0), 0.5);
    assert!(store.get_bool("enabled", false));

    assert_eq!(store.get_int("missing", 7), 7);
    assert_eq!(store.get_int("label", -1), -1);
    assert_eq!(store.get::<String>("attempts", "none".into()), "none");
}

#[test]
fn test_get_required_reports_missing_or_wrong_type() {
    let ctx = context();
    ctx.store().set("label", "checkout");

    assert_eq!(
        ctx.store().get_required::<i64>("label").unwrap_err(),
        ContextError::Missing {
            key: "label".to_string(),
            expected: "int",
        }
    );
    assert!(ctx.store().get_required::<bool>("nothing").is_err());
    assert_eq!(
        ctx.store().get_required::<String>("label").unwrap(),
        "checkout"
    );
    assert_eq!(
        ctx.store().get_required::<Value>("label").unwrap(),
        Value::String("checkout".into())
    );
}

#[test]
fn test_steps_are_write_once() {
    let ctx = context();
    ctx.steps().record("extract", record(json!({ "id": 1 }))).unwrap();

    let err = ctx
        .steps()
        .record("extract", record(json!({ "id": 2 })))
        .unwrap_err();
    assert_eq!(
        err,
        ContextError::AlreadyRecorded {
            node: "extract".to_string()
        }
    );
    assert_eq!(ctx.steps().output("extract"), Some(json!({ "id": 1 })));
}

#[test]
fn test_clones_share_the_run() {
    let ctx = context();
    let other = ctx.clone();
    other.steps().record("a", record(json!(1))).unwrap();
    other.store().set("k", "v");

    assert!(ctx.steps().contains("a"));
    assert_eq!(ctx.store().get_string("k", ""), "v");
    assert_eq!(ctx.run_id(), other.run_id());
}

struct Pool {
    name: String,
}

impl HostResource for Pool {
    fn kind(&self) -> &str {
        "pool"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[test]
fn test_handles_do_not_keep_resources_alive() {
    let ctx = context();
    let pool: Arc<dyn HostResource> = Arc::new(Pool {
        name: "primary".to_string(),
    });
    ctx.handles().insert("db", &pool);

    let handle = ctx.handles().get("db").unwrap();
    assert_eq!(handle.kind(), "pool");
    let concrete = handle.as_any().downcast_ref::<Pool>().unwrap();
    assert_eq!(concrete.name, "primary");
    drop(handle);

    drop(pool);
    assert_eq!(
        ctx.handles().get("db").unwrap_err(),
        ContextError::HandleGone("db".to_string())
    );
    assert!(matches!(
        ctx.handles().get("cache").unwrap_err(),
        ContextError::Missing { .. }
    ));
}

#[test]
fn test_scope_exposes_run_roots() {
    let ctx = context();
    ctx.steps()
        .record("fetch", record(json!({ "status": 200 })))
        .unwrap();
    let input = json!({ "q": "rust" });
    let scope = ctx.scope(&input);

    assert_eq!(resolve("{{ $json.q }}", &scope).unwrap(), json!("rust"));
    assert_eq!(
        resolve("{{ $context.tenantId }}", &scope).unwrap(),
        json!("acme")
    );
    assert_eq!(
        resolve("{{ $context.requestId }}", &scope).unwrap(),
        json!("req-42")
    );
    assert_eq!(
        resolve("{{ $config.region }}", &scope).unwrap(),
        json!("eu-west")
    );
    assert_eq!(
        resolve("{{ $steps.fetch.output.status }}", &scope).unwrap(),
        json!(200)
    );
}

#[test]
fn test_variables_are_coerced_by_type() {
    let mut declared = BTreeMap::new();
    for variable in [
        Variable::new("limit", VariableType::Number).with_default("25"),
        Variable::new("debug", VariableType::Boolean).with_default("false"),
        Variable::new("regions", VariableType::Array).with_default(r#"["eu","us"]"#),
        Variable::new("since", VariableType::Date).with_default("2024-03-01T12:00:00+02:00"),
        Variable::new("label", VariableType::String).with_default("42"),
        Variable::new("extra", VariableType::Any).with_default(r#"{"a":1}"#),
        Variable::new("unset", VariableType::String),
    ] {
        declared.insert(variable.name.clone(), variable);
    }

    let config = resolve_variables(&declared, &Map::new()).unwrap();
    assert_eq!(config["limit"], json!(25.0));
    assert_eq!(config["debug"], json!(false));
    assert_eq!(config["regions"], json!(["eu", "us"]));
    assert_eq!(config["since"], json!("2024-03-01T10:00:00.000Z"));
    assert_eq!(config["label"], json!("42"));
    assert_eq!(config["extra"], json!({ "a": 1 }));
    assert!(!config.contains_key("unset"));
}

#[test]
fn test_variable_overrides_and_failures() {
    let mut declared = BTreeMap::new();
    declared.insert(
        "limit".to_string(),
        Variable::new("limit", VariableType::Number).with_default("25"),
    );
    declared.insert(
        "apiKey".to_string(),
        Variable::new("apiKey", VariableType::String).required(),
    );

    let mut overrides = Map::new();
    overrides.insert("limit".to_string(), json!(5));
    overrides.insert("apiKey".to_string(), json!("secret"));
    let config = resolve_variables(&declared, &overrides).unwrap();
    assert_eq!(config["limit"], json!(5));
    assert_eq!(config["apiKey"], json!("secret"));

    assert_eq!(
        resolve_variables(&declared, &Map::new()).unwrap_err(),
        WorkflowError::VariableMissing("apiKey".to_string())
    );

    let mut bad = Map::new();
    bad.insert("apiKey".to_string(), json!("secret"));
    bad.insert("limit".to_string(), json!("lots"));
    assert!(matches!(
        resolve_variables(&declared, &bad).unwrap_err(),
        WorkflowError::VariableType { .. }
    ));
}

#[tokio::test]
async fn test_emitter_reaches_subscribers() {
    let bus = EventBus::new(16);
    let mut rx = bus.subscribe();
    let ctx = context();
    let emitter = bus.create_emitter(ctx.run_id(), "notify");

    emitter.data("order.created", json!({ "id": 7 }));

    match rx.recv().await.unwrap() {
        ExecutionEvent::NodeEvent { node, event, .. } => {
            assert_eq!(node, "notify");
            match event {
                NodeEvent::Data { name, value } => {
                    assert_eq!(name, "order.created");
                    assert_eq!(value, json!({ "id": 7 }));
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
        other => panic!("unexpected event {:?}", other),
    }

    // No subscribers left: emitting must not fail.
    drop(rx);
    emitter.info("still fine");
}

#[test]
fn test_integer_parameters_are_not_cast() {
    let parameters = match json!({ "ok": 2, "float": 2.0, "neg": -1, "half": 1.5, "big": 70000 }) {
        serde_json::Value::Object(map) => Parameters::new(map),
        _ => unreachable!(),
    };

    assert_eq!(parameters.require_u64("ok").unwrap(), 2);
    assert_eq!(parameters.require_u64("float").unwrap(), 2);
    assert!(matches!(
        parameters.require_u64("neg").unwrap_err(),
        HandlerError::TypeMismatch { ref field, .. } if field == "neg"
    ));
    assert!(matches!(
        parameters.require_u64("half").unwrap_err(),
        HandlerError::TypeMismatch { .. }
    ));
    assert_eq!(parameters.get_u64_in("missing", 100..=599).unwrap(), None);
    assert_eq!(parameters.get_u64_in("big", 0..=100_000).unwrap(), Some(70000));
    assert!(matches!(
        parameters.get_u64_in("big", 100..=599).unwrap_err(),
        HandlerError::TypeMismatch { .. }
    ));
}
