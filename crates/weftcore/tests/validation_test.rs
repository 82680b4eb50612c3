// crates/weftcore/tests/validation_test.rs

use serde_json::{json, Value as Json};
use weftcore::validation::{validate, Issue, IssueKind, TypeCatalog, ValidationOptions, Validator};

fn document() -> Json {
    json!({
        "id": "wf-1",
        "name": "orders",
        "active": true,
        "versionId": "v1",
        "tags": ["api"],
        "variables": {
            "limit": { "type": "number", "defaultValue": "10" }
        },
        "nodes": [
            { "id": "n1", "name": "extract", "type": "parse.json", "typeVersion": 1,
              "position": [0, 0], "parameters": { "source": "{{ $json.body }}" } },
            { "id": "n2", "name": "check", "type": "validate.fields", "typeVersion": 1,
              "position": [200, 0], "parameters": { "required": ["id"] } },
            { "id": "n3", "name": "reply", "type": "respond.json", "typeVersion": 1,
              "position": [400, 0], "parameters": {} }
        ],
        "connections": {
            "extract": { "main": { "0": [{ "node": "check", "type": "main", "index": 0 }] } },
            "check": { "main": { "0": [{ "node": "reply", "type": "main", "index": 0 }] } }
        },
        "staticData": {},
        "settings": {}
    })
}

fn fields<'a>(issues: &'a [Issue], kind: IssueKind) -> Vec<&'a str> {
    issues
        .iter()
        .filter(|i| i.kind == kind)
        .map(|i| i.field.as_str())
        .collect()
}

#[test]
fn test_valid_document_has_no_issues() {
    let report = validate(&document(), ValidationOptions::default());
    assert!(report.ok, "unexpected issues: {:?}", report.issues);
    assert!(report.issues.is_empty());

    let strict = validate(&document(), ValidationOptions::strict());
    assert!(strict.ok);
}

#[test]
fn test_missing_top_level_fields() {
    for field in ["id", "name", "nodes", "connections"] {
        let mut doc = document();
        doc.as_object_mut().unwrap().remove(field);
        let report = validate(&doc, ValidationOptions::default());
        assert!(!report.ok, "document without {} passed", field);
        assert!(
            report.at(field).any(Issue::is_error),
            "no error names {}: {:?}",
            field,
            report.issues
        );
    }
}

#[test]
fn test_non_object_document() {
    let report = validate(&json!([1, 2, 3]), ValidationOptions::default());
    assert!(!report.ok);
    assert_eq!(report.issues.len(), 1);
}

#[test]
fn test_wrong_top_level_shapes() {
    let mut doc = document();
    doc["nodes"] = json!({});
    doc["connections"] = json!([]);
    doc["active"] = json!("yes");
    let report = validate(&doc, ValidationOptions::default());
    let errors = fields(&report.issues, IssueKind::Error);
    assert!(errors.contains(&"nodes"));
    assert!(errors.contains(&"connections"));
    assert!(errors.contains(&"active"));
}

#[test]
fn test_one_error_per_missing_node_property() {
    let mut doc = document();
    doc["nodes"][0].as_object_mut().unwrap().remove("name");
    doc["nodes"][0].as_object_mut().unwrap().remove("typeVersion");
    doc["nodes"][1].as_object_mut().unwrap().remove("typeVersion");
    let report = validate(&doc, ValidationOptions::default());
    assert!(!report.ok);

    assert_eq!(report.at("nodes[0].name").count(), 1);
    assert_eq!(report.at("nodes[0].typeVersion").count(), 1);
    assert_eq!(report.at("nodes[1].typeVersion").count(), 1);
    assert_eq!(report.at("nodes[1].name").count(), 0);
}

#[test]
fn test_type_version_must_be_positive_integer() {
    let mut doc = document();
    doc["nodes"][0]["typeVersion"] = json!(0);
    doc["nodes"][1]["typeVersion"] = json!("1");
    let report = validate(&doc, ValidationOptions::default());
    assert_eq!(report.at("nodes[0].typeVersion").count(), 1);
    assert_eq!(report.at("nodes[1].typeVersion").count(), 1);
}

#[test]
fn test_nested_node_inside_parameters() {
    let mut doc = document();
    doc["nodes"][1]["parameters"] = json!({
        "name": "check",
        "typeVersion": 1,
        "position": [200, 0],
        "required": ["id"]
    });
    let report = validate(&doc, ValidationOptions::default());
    let issues: Vec<&Issue> = report.at("nodes[1].parameters").collect();
    assert_eq!(issues.len(), 1, "expected one issue per node: {:?}", issues);
    assert!(issues[0].is_error());
    assert!(issues[0].message.contains("typeVersion"));
}

#[test]
fn test_object_object_detected_at_any_depth() {
    let mut doc = document();
    doc["nodes"][0]["parameters"] = json!({
        "top": "[object Object]",
        "a": { "b": ["fine", { "c": "fine" }, "[object Object]"] }
    });
    let report = validate(&doc, ValidationOptions::default());
    assert!(!report.ok);
    let errors = fields(&report.issues, IssueKind::Error);
    assert!(errors.contains(&"nodes[0].parameters.top"));
    assert!(errors.contains(&"nodes[0].parameters.a.b[2]"));
    assert_eq!(errors.len(), 2);
}

#[test]
fn test_duplicate_names_and_ids() {
    let mut doc = document();
    doc["nodes"][2]["name"] = json!("extract");
    doc["nodes"][2]["id"] = json!("n1");
    let report = validate(&doc, ValidationOptions::default());
    assert!(report.at("nodes[2].name").any(Issue::is_error));
    assert!(report
        .at("nodes[2].id")
        .any(|i| i.kind == IssueKind::Warning));
}

#[test]
fn test_position_and_on_error_shapes() {
    let mut doc = document();
    doc["nodes"][0]["position"] = json!([1]);
    doc["nodes"][1]["onError"] = json!("explode");
    doc["nodes"][2]["onError"] = json!({ "retry": { "maxRetries": 2, "retryDelayMs": 10 } });
    let report = validate(&doc, ValidationOptions::default());
    assert_eq!(
        fields(&report.issues, IssueKind::Warning),
        vec!["nodes[0].position"]
    );
    assert_eq!(fields(&report.issues, IssueKind::Error), vec!["nodes[1].onError"]);
}

#[test]
fn test_connection_integrity() {
    let mut doc = document();
    doc["connections"] = json!({
        "ghost": { "main": { "0": [{ "node": "check" }] } },
        "extract": {
            "side": { "0": [{ "node": "check" }] },
            "main": {
                "first": [{ "node": "check" }],
                "0": [{ "node": "nowhere" }, { "type": "main" }, "check"]
            }
        }
    });
    let report = validate(&doc, ValidationOptions::default());

    let warnings = fields(&report.issues, IssueKind::Warning);
    assert!(warnings.contains(&"connections.ghost"));
    assert!(warnings.contains(&"connections.extract.main.0[0].node"));

    let errors = fields(&report.issues, IssueKind::Error);
    assert!(errors.contains(&"connections.extract.side"));
    assert!(errors.contains(&"connections.extract.main.first"));
    assert!(errors.contains(&"connections.extract.main.0[1].node"));
    assert!(errors.contains(&"connections.extract.main.0[2]"));
}

#[test]
fn test_dangling_reference_fails_only_in_strict_mode() {
    let mut doc = document();
    doc["connections"]["check"]["main"]["0"][0]["node"] = json!("missing");

    let lenient = validate(&doc, ValidationOptions::default());
    assert!(lenient.ok);
    assert_eq!(lenient.warnings().count(), 1);

    let strict = validate(&doc, ValidationOptions::strict());
    assert!(!strict.ok);
    assert_eq!(strict.issues, lenient.issues);
}

#[test]
fn test_variable_declarations() {
    let mut doc = document();
    doc["variables"] = json!({
        "ok_name": { "type": "string" },
        "9lives": { "type": "number" },
        "kind": { "type": "decimal" },
        "untyped": { "description": "no type" },
        "scalar": "string"
    });
    let report = validate(&doc, ValidationOptions::default());
    let errors = fields(&report.issues, IssueKind::Error);
    assert!(errors.contains(&"variables.9lives"));
    assert!(errors.contains(&"variables.kind.type"));
    assert!(errors.contains(&"variables.untyped.type"));
    assert!(errors.contains(&"variables.scalar"));
    assert!(!errors.iter().any(|f| f.starts_with("variables.ok_name")));
}

#[test]
fn test_tenant_mode() {
    let lenient = ValidationOptions::default().with_tenant_mode(true);
    let strict = ValidationOptions::strict().with_tenant_mode(true);

    let report = validate(&document(), lenient);
    assert!(report.ok);
    assert_eq!(
        report.at("tenantId").map(|i| i.kind).collect::<Vec<_>>(),
        vec![IssueKind::Warning]
    );

    let report = validate(&document(), strict);
    assert!(!report.ok);
    assert_eq!(report.at("tenantId").count(), 1);

    let mut doc = document();
    doc["tenantId"] = json!("acme");
    assert!(validate(&doc, strict).issues.is_empty());

    // Outside tenant mode the field is not required.
    assert!(validate(&document(), ValidationOptions::strict()).ok);
}

#[test]
fn test_triggers() {
    let mut doc = document();
    doc["triggers"] = json!([
        { "nodeId": "n1", "kind": "webhook" },
        { "nodeId": "extract", "kind": "manual", "enabled": false },
        { "nodeId": "elsewhere", "kind": "schedule" },
        { "kind": "carrier-pigeon" }
    ]);
    let report = validate(&doc, ValidationOptions::default());
    assert_eq!(
        fields(&report.issues, IssueKind::Warning),
        vec!["triggers[2].nodeId"]
    );
    let errors = fields(&report.issues, IssueKind::Error);
    assert!(errors.contains(&"triggers[3].nodeId"));
    assert!(errors.contains(&"triggers[3].kind"));
}

struct Known(&'static [&'static str]);

impl TypeCatalog for Known {
    fn knows(&self, op_type: &str) -> bool {
        self.0.contains(&op_type)
    }
}

#[test]
fn test_unknown_operation_type_is_a_warning() {
    let catalog = Known(&["parse.json", "validate.fields"]);
    let report = Validator::new().validate(&document(), ValidationOptions::default(), Some(&catalog));
    assert!(report.ok);
    assert_eq!(
        fields(&report.issues, IssueKind::Warning),
        vec!["nodes[2].type"]
    );
}

#[test]
fn test_report_is_never_short_circuited() {
    let doc = json!({
        "nodes": [ { "parameters": { "name": "x", "v": "[object Object]" } } ],
        "connections": { "a": { "bogus": { "x": [] } } },
        "variables": { "1bad": { "type": "nope" } }
    });
    let report = validate(&doc, ValidationOptions::default());
    // id, name, node id/name/type/typeVersion, nested params, object-object,
    // dangling source, bad port, bad index, bad variable name, bad type.
    assert!(report.errors().count() >= 12, "{:#?}", report.issues);
    assert!(report.warnings().count() >= 1);
}

#[test]
fn test_report_serializes_in_wire_shape() {
    let mut doc = document();
    doc.as_object_mut().unwrap().remove("id");
    let report = validate(&doc, ValidationOptions::default());
    let wire = serde_json::to_value(&report).unwrap();
    assert_eq!(
        wire,
        json!({
            "ok": false,
            "issues": [
                { "kind": "error", "field": "id", "message": "missing required property 'id'" }
            ]
        })
    );
}
