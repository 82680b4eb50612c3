// crates/weftnodes/tests/handlers_test.rs

use serde_json::{json, Value as Json};
use std::sync::Arc;
use weftcore::{ExecutionEvent, NodeEvent, RequestContext};
use weftnodes::{digest, register_all, Stores};
use weftruntime::{Engine, OperationRegistry, RunStatus, RuntimeConfig};

/// Initialize tracing for tests
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

fn engine() -> (Engine, Stores) {
    let mut registry = OperationRegistry::new();
    let stores = register_all(&mut registry);
    (
        Engine::with_registry(Arc::new(registry), RuntimeConfig::default()),
        stores,
    )
}

/// A request whose tenant the host has already resolved.
fn acme() -> RequestContext {
    RequestContext::new("r").with_tenant("acme")
}

fn node(name: &str, op_type: &str, parameters: Json) -> Json {
    json!({
        "id": format!("id-{}", name),
        "name": name,
        "type": op_type,
        "typeVersion": 1,
        "position": [0, 0],
        "parameters": parameters
    })
}

fn link(target: &str) -> Json {
    json!([{ "node": target, "type": "main", "index": 0 }])
}

fn workflow(nodes: Vec<Json>, connections: Json) -> Json {
    json!({
        "id": "wf-nodes",
        "name": "standard handlers",
        "active": true,
        "versionId": "v1",
        "tenantId": "acme",
        "tags": ["test"],
        "variables": {},
        "nodes": nodes,
        "connections": connections,
        "staticData": {},
        "settings": {}
    })
}

fn linear(nodes: Vec<Json>) -> Json {
    let names: Vec<String> = nodes
        .iter()
        .map(|n| n["name"].as_str().unwrap_or_default().to_string())
        .collect();
    let mut connections = serde_json::Map::new();
    for pair in names.windows(2) {
        connections.insert(pair[0].clone(), json!({ "main": { "0": link(&pair[1]) } }));
    }
    workflow(nodes, Json::Object(connections))
}

fn extract_validate_respond() -> Json {
    linear(vec![
        node("extract", "parse.json", json!({ "source": "{{ $json.body }}" })),
        node("validate", "validate.fields", json!({ "required": ["id", "qty"] })),
        node("respond", "respond.json", json!({})),
    ])
}

#[tokio::test]
async fn test_extract_validate_respond_succeeds() {
    init_tracing();
    let (engine, _) = engine();

    let result = engine
        .execute(
            &extract_validate_respond(),
            json!({ "body": "{\"id\": 1, \"qty\": 2}" }),
            RequestContext::new("r1").with_tenant("acme"),
        )
        .await;

    assert_eq!(result.status, RunStatus::Succeeded);
    assert_eq!(
        result.completed_node_names,
        vec!["extract", "validate", "respond"]
    );
    assert_eq!(
        result.response,
        Some(json!({ "status": 200, "body": { "id": 1, "qty": 2 } }))
    );
}

#[tokio::test]
async fn test_extract_validate_respond_fails_on_invalid_input() {
    init_tracing();
    let (engine, _) = engine();

    let result = engine
        .execute(
            &extract_validate_respond(),
            json!({ "body": "{\"id\": 1}" }),
            RequestContext::new("r2").with_tenant("acme"),
        )
        .await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.failed_node.as_deref(), Some("validate"));
    assert_eq!(result.completed_node_names, vec!["extract"]);
    assert!(result.error.unwrap().contains("qty"));
}

fn routing() -> Json {
    workflow(
        vec![
            node("check", "condition", json!({ "condition": "{{ $json.amount > 100 }}" })),
            node("review", "transform", json!({ "set": { "route": "review" } })),
            node("approve", "transform", json!({ "set": { "route": "auto" } })),
        ],
        json!({
            "check": { "main": { "0": link("review"), "1": link("approve") } }
        }),
    )
}

#[tokio::test]
async fn test_condition_true_follows_output_zero() {
    init_tracing();
    let (engine, _) = engine();

    let result = engine
        .execute(&routing(), json!({ "amount": 250 }), acme())
        .await;

    assert_eq!(result.status, RunStatus::Succeeded);
    assert_eq!(result.completed_node_names, vec!["check", "review"]);
}

#[tokio::test]
async fn test_condition_false_follows_output_one() {
    init_tracing();
    let (engine, _) = engine();

    let result = engine
        .execute(&routing(), json!({ "amount": 20 }), acme())
        .await;

    assert_eq!(result.status, RunStatus::Succeeded);
    assert_eq!(result.completed_node_names, vec!["check", "approve"]);
}

#[tokio::test]
async fn test_transform_sets_and_removes_fields() {
    init_tracing();
    let (engine, _) = engine();
    let doc = linear(vec![
        node(
            "shape",
            "transform",
            json!({ "set": { "total": "{{ $json.qty }}" }, "remove": ["secret"] }),
        ),
        node("respond", "respond.json", json!({ "status": 201 })),
    ]);

    let result = engine
        .execute(&doc, json!({ "qty": 3, "secret": "x" }), acme())
        .await;

    assert_eq!(result.status, RunStatus::Succeeded);
    assert_eq!(
        result.response,
        Some(json!({ "status": 201, "body": { "qty": 3, "total": 3 } }))
    );
}

#[tokio::test]
async fn test_kv_cas_put_in_sequence() {
    init_tracing();
    let (engine, stores) = engine();
    let doc = linear(vec![
        node("create", "kv.put", json!({ "key": "order/1", "value": { "state": "new" } })),
        node(
            "update",
            "kv.cas_put",
            json!({ "key": "order/1", "value": { "state": "paid" }, "expectedVersion": "{{ $json.version }}" }),
        ),
    ]);

    let result = engine.execute(&doc, json!({}), acme()).await;

    assert_eq!(result.status, RunStatus::Succeeded);
    assert_eq!(
        stores.kv.get("acme", "order/1").await,
        Some((json!({ "state": "paid" }), 2))
    );
    assert_eq!(stores.kv.get("globex", "order/1").await, None);
}

#[tokio::test]
async fn test_kv_conflict_stops_run_even_under_continue() {
    init_tracing();
    let (engine, stores) = engine();
    let mut update = node(
        "update",
        "kv.cas_put",
        json!({ "key": "order/1", "value": 2, "expectedVersion": 7 }),
    );
    update["onError"] = json!({ "retry": { "maxRetries": 3, "retryDelayMs": 1 } });
    let mut doc = linear(vec![
        node("create", "kv.put", json!({ "key": "order/1", "value": 1 })),
        update,
        node("after", "transform", json!({})),
    ]);

    let result = engine.execute(&doc, json!({}), acme()).await;
    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.failed_node.as_deref(), Some("update"));
    assert!(result.error.unwrap().contains("expected 7, found 1"));
    assert_eq!(stores.kv.get("acme", "order/1").await, Some((json!(1), 1)));

    doc["nodes"][1]["onError"] = json!("continue");
    let again = engine.execute(&doc, json!({}), acme()).await;
    assert_eq!(again.status, RunStatus::Failed);
    assert_eq!(again.failed_node.as_deref(), Some("update"));
}

#[tokio::test]
async fn test_kv_requires_request_tenant() {
    init_tracing();
    let (engine, stores) = engine();
    // the document names a tenant, but only the request's identity counts
    let doc = linear(vec![node("write", "kv.put", json!({ "key": "k", "value": 1 }))]);

    let result = engine.execute(&doc, json!({}), RequestContext::new("r")).await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.failed_node.as_deref(), Some("write"));
    assert!(result.error.unwrap().contains("tenantId"));
    assert_eq!(stores.kv.get("acme", "k").await, None);
}

#[tokio::test]
async fn test_kv_cas_rejects_non_integer_version() {
    init_tracing();
    let (engine, stores) = engine();
    for expected in [json!(-1), json!(1.5), json!("1")] {
        let doc = linear(vec![node(
            "update",
            "kv.cas_put",
            json!({ "key": "k", "value": 1, "expectedVersion": expected }),
        )]);

        let result = engine.execute(&doc, json!({}), acme()).await;

        assert_eq!(result.status, RunStatus::Failed);
        assert!(result
            .error
            .unwrap()
            .contains("Invalid type for 'expectedVersion'"));
    }
    assert_eq!(stores.kv.get("acme", "k").await, None);
}

#[tokio::test]
async fn test_blob_digest_roundtrip() {
    init_tracing();
    let (engine, stores) = engine();
    let doc = linear(vec![
        node("store", "blob.put", json!({ "key": "a.txt", "content": "hello" })),
        node(
            "verify",
            "blob.verify_digest",
            json!({ "key": "a.txt", "digest": "{{ $steps.store.output.digest }}" }),
        ),
        node("respond", "respond.json", json!({})),
    ]);

    let result = engine.execute(&doc, json!({}), acme()).await;

    assert_eq!(result.status, RunStatus::Succeeded);
    assert_eq!(stores.blobs.len().await, 1);
    let body = &result.response.unwrap()["body"];
    assert_eq!(body["digest"], json!(digest(b"hello")));
    assert_eq!(body["verified"], json!(true));
}

#[tokio::test]
async fn test_blob_digest_mismatch_is_fatal() {
    init_tracing();
    let (engine, stores) = engine();
    let mut put = node(
        "store",
        "blob.put",
        json!({ "key": "a.txt", "content": "hello", "digest": "0000" }),
    );
    put["onError"] = json!("continue");
    let doc = linear(vec![put, node("after", "transform", json!({}))]);

    let result = engine.execute(&doc, json!({}), acme()).await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.failed_node.as_deref(), Some("store"));
    assert!(result.error.unwrap().contains("Digest mismatch"));
    assert_eq!(stores.blobs.len().await, 0);
}

#[tokio::test]
async fn test_txn_marker_lifecycle() {
    init_tracing();
    let (engine, stores) = engine();
    let doc = linear(vec![
        node("begin", "txn.begin", json!({})),
        node("write", "kv.put", json!({ "key": "k", "value": "v" })),
        node("commit", "txn.commit", json!({})),
    ]);

    let result = engine.execute(&doc, json!({}), acme()).await;

    assert_eq!(result.status, RunStatus::Succeeded);
    assert_eq!(stores.kv.get("acme", "k").await, Some((json!("v"), 1)));
}

#[tokio::test]
async fn test_txn_abort_rolls_back_writes() {
    init_tracing();
    let (engine, stores) = engine();
    let seed = linear(vec![
        node("seed", "kv.put", json!({ "key": "k", "value": "v0" })),
        node("seed_other", "kv.put", json!({ "key": "other", "value": "keep me" })),
    ]);
    assert!(engine.execute(&seed, json!({}), acme()).await.is_success());

    let doc = linear(vec![
        node("begin", "txn.begin", json!({})),
        node("write", "kv.put", json!({ "key": "k", "value": "v" })),
        node("bump", "kv.cas_put", json!({ "key": "k", "value": "v2", "expectedVersion": 2 })),
        node("create", "kv.put", json!({ "key": "new", "value": 1 })),
        node("drop", "kv.delete", json!({ "key": "other" })),
        node("store", "blob.put", json!({ "key": "a.txt", "content": "draft" })),
        node("abort", "txn.abort", json!({})),
    ]);

    let result = engine.execute(&doc, json!({}), acme()).await;

    assert_eq!(result.status, RunStatus::Succeeded);
    assert_eq!(result.completed_node_names.len(), 7);
    assert_eq!(stores.kv.get("acme", "k").await, Some((json!("v0"), 1)));
    assert_eq!(stores.kv.get("acme", "new").await, None);
    assert_eq!(
        stores.kv.get("acme", "other").await,
        Some((json!("keep me"), 1))
    );
    assert!(stores.blobs.is_empty().await);
}

#[tokio::test]
async fn test_writes_outside_txn_survive_abort() {
    init_tracing();
    let (engine, stores) = engine();
    let doc = linear(vec![
        node("before", "kv.put", json!({ "key": "early", "value": 1 })),
        node("begin", "txn.begin", json!({})),
        node("write", "kv.put", json!({ "key": "late", "value": 2 })),
        node("abort", "txn.abort", json!({})),
        node("after", "blob.put", json!({ "key": "b.txt", "content": "kept" })),
    ]);

    let result = engine.execute(&doc, json!({}), acme()).await;

    assert_eq!(result.status, RunStatus::Succeeded);
    assert_eq!(stores.kv.get("acme", "early").await, Some((json!(1), 1)));
    assert_eq!(stores.kv.get("acme", "late").await, None);
    assert_eq!(stores.blobs.get("acme", "b.txt").await.as_deref(), Some("kept"));
}

#[tokio::test]
async fn test_txn_misuse_fails() {
    init_tracing();
    let (engine, _) = engine();

    let nested = linear(vec![
        node("begin", "txn.begin", json!({})),
        node("again", "txn.begin", json!({})),
    ]);
    let result = engine.execute(&nested, json!({}), acme()).await;
    assert_eq!(result.failed_node.as_deref(), Some("again"));

    let orphan = linear(vec![node("abort", "txn.abort", json!({}))]);
    let result = engine.execute(&orphan, json!({}), acme()).await;
    assert_eq!(result.status, RunStatus::Failed);
    assert!(result.error.unwrap().contains("no active transaction"));
}

#[tokio::test]
async fn test_emit_event_publishes_data() {
    init_tracing();
    let (engine, _) = engine();
    let mut events = engine.subscribe_events();
    let doc = linear(vec![
        node("notify", "emit.event", json!({ "event": "order.created", "data": { "id": "{{ $json.id }}" } })),
        node("respond", "respond.json", json!({})),
    ]);

    let result = engine
        .execute(&doc, json!({ "id": 9 }), acme())
        .await;
    assert!(result.is_success());
    assert_eq!(result.response, Some(json!({ "status": 200, "body": { "id": 9 } })));

    let mut published = None;
    while let Ok(event) = events.try_recv() {
        if let ExecutionEvent::NodeEvent {
            event: NodeEvent::Data { name, value },
            ..
        } = event
        {
            published = Some((name, value));
        }
    }
    assert_eq!(
        published,
        Some(("order.created".to_string(), json!({ "id": 9 })))
    );
}

#[tokio::test]
async fn test_respond_rejects_out_of_range_status() {
    init_tracing();
    let (engine, _) = engine();
    for status in [json!(70000), json!(99), json!(200.5)] {
        let doc = linear(vec![node("respond", "respond.json", json!({ "status": status }))]);

        let result = engine.execute(&doc, json!({}), acme()).await;

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.response, None);
        assert!(result.error.unwrap().contains("Invalid type for 'status'"));
    }
}

#[tokio::test]
async fn test_proxy_fetch_malformed_request_is_not_retried() {
    init_tracing();
    let (engine, _) = engine();
    let mut events = engine.subscribe_events();
    let mut fetch = node(
        "fetch",
        "proxy.fetch",
        json!({ "url": "http://127.0.0.1:9/ping", "headers": { "bad header": "x" } }),
    );
    fetch["onError"] = json!({ "retry": { "maxRetries": 3, "retryDelayMs": 1 } });
    let doc = linear(vec![fetch]);

    let result = engine.execute(&doc, json!({}), acme()).await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.failed_node.as_deref(), Some("fetch"));
    assert!(result.error.unwrap().contains("Malformed request"));

    let mut retries = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, ExecutionEvent::NodeRetrying { .. }) {
            retries += 1;
        }
    }
    assert_eq!(retries, 0);
}

#[tokio::test]
async fn test_parse_json_rejects_bad_text() {
    init_tracing();
    let (engine, _) = engine();
    let doc = linear(vec![node("extract", "parse.json", json!({ "source": "{not json" }))]);

    let result = engine.execute(&doc, json!({}), acme()).await;

    assert_eq!(result.status, RunStatus::Failed);
    assert!(result.error.unwrap().contains("JSON parse error"));
}

#[test]
fn test_register_all_lists_families() {
    let mut registry = OperationRegistry::new();
    register_all(&mut registry);

    for op in [
        "condition",
        "transform",
        "respond.json",
        "respond.error",
        "emit.event",
        "txn.begin",
        "validate.fields",
        "parse.json",
        "kv.cas_put",
        "blob.verify_digest",
        "proxy.fetch",
    ] {
        assert!(registry.contains(op), "{} should resolve", op);
    }
    assert!(!registry.contains("index.query"));
}
