// crates/weftcore/tests/expression_test.rs

use serde_json::json;
use weftcore::expression::{is_template, resolve, resolve_value, MapScope, Template};
use weftcore::ExpressionError;

fn scope() -> MapScope {
    MapScope::new()
        .with(
            "$json",
            json!({
                "user": { "name": "Ada", "age": 36, "email": "" },
                "items": [{ "url": "https://a.example" }, { "url": "https://b.example" }],
                "count": 3,
            }),
        )
        .with("$context", json!({ "tenantId": "acme", "requestId": "req-1" }))
        .with("$config", json!({ "greeting": "Hello", "limit": 10 }))
        .with(
            "$steps",
            json!({ "fetch": { "output": { "status": 200, "body": { "ok": true } } } }),
        )
}

#[test]
fn test_literal_passes_through() {
    let value = resolve("plain text, no markers", &scope()).unwrap();
    assert_eq!(value, json!("plain text, no markers"));
    assert!(!is_template("plain text"));
}

#[test]
fn test_single_marker_keeps_type() {
    assert_eq!(resolve("{{ $json.count }}", &scope()).unwrap(), json!(3));
    assert_eq!(resolve("  {{ $json.user }} ", &scope()).unwrap()["name"], json!("Ada"));
    assert_eq!(
        resolve("{{ $steps.fetch.output.body.ok }}", &scope()).unwrap(),
        json!(true)
    );
}

#[test]
fn test_interpolation_renders_string() {
    let value = resolve(
        "{{ $config.greeting }}, {{ $json.user.name }} ({{ $context.tenantId }})",
        &scope(),
    )
    .unwrap();
    assert_eq!(value, json!("Hello, Ada (acme)"));
}

#[test]
fn test_bracket_and_dotted_index_access() {
    let s = scope();
    assert_eq!(
        resolve("{{ $json.items[1].url }}", &s).unwrap(),
        json!("https://b.example")
    );
    assert_eq!(
        resolve("{{ $json.items.0.url }}", &s).unwrap(),
        json!("https://a.example")
    );
    assert_eq!(resolve("{{ $json['user']['age'] }}", &s).unwrap(), json!(36));
}

#[test]
fn test_unresolved_reference_is_an_error() {
    let err = resolve("{{ $json.user.phone }}", &scope()).unwrap_err();
    assert_eq!(
        err,
        ExpressionError::Unresolved {
            path: "$json.user.phone".to_string()
        }
    );

    let err = resolve("{{ $steps.missing.output }}", &scope()).unwrap_err();
    assert!(matches!(err, ExpressionError::Unresolved { .. }));
}

#[test]
fn test_fallback_catches_missing_and_falsy() {
    let s = scope();
    assert_eq!(
        resolve("{{ $json.user.phone || 'n/a' }}", &s).unwrap(),
        json!("n/a")
    );
    assert_eq!(
        resolve("{{ $json.user.email || 'none' }}", &s).unwrap(),
        json!("none")
    );
    assert_eq!(resolve("{{ $json.user.name || 'anon' }}", &s).unwrap(), json!("Ada"));
}

#[test]
fn test_ternary_and_comparison() {
    let s = scope();
    assert_eq!(
        resolve("{{ $json.user.age >= 18 ? 'adult' : 'minor' }}", &s).unwrap(),
        json!("adult")
    );
    assert_eq!(
        resolve("{{ $json.count == 3 && $config.limit > 5 }}", &s).unwrap(),
        json!(true)
    );
    assert_eq!(resolve("{{ !$json.user.email }}", &s).unwrap(), json!(true));
}

#[test]
fn test_helper_namespace() {
    let s = scope();
    assert_eq!(resolve("{{ str.upper($json.user.name) }}", &s).unwrap(), json!("ADA"));
    assert_eq!(resolve("{{ coll.length($json.items) }}", &s).unwrap(), json!(2));
    assert_eq!(
        resolve("{{ coll.join(['a', 'b', 'c'], '-') }}", &s).unwrap(),
        json!("a-b-c")
    );
    assert_eq!(
        resolve("{{ date.addDays('2024-01-30T00:00:00Z', 2) }}", &s).unwrap(),
        json!("2024-02-01T00:00:00.000Z")
    );
    assert_eq!(
        resolve("{{ json.parse('{\"a\": 1}').a }}", &s).unwrap(),
        json!(1)
    );
}

#[test]
fn test_date_shift_out_of_range_is_an_error() {
    let s = scope();
    for days in ["1000000000", "-1000000000", "100000000000000000000"] {
        let template = format!("{{{{ date.addDays('2024-01-01T00:00:00Z', {}) }}}}", days);
        assert!(matches!(
            resolve(&template, &s).unwrap_err(),
            ExpressionError::BadArgument { ref function, .. } if function == "date.addDays"
        ));
    }
}

#[test]
fn test_no_arbitrary_code() {
    let s = scope();
    assert_eq!(
        resolve("{{ os.exec('rm -rf /') }}", &s).unwrap_err(),
        ExpressionError::UnknownFunction("os.exec".to_string())
    );
    assert!(matches!(
        resolve("{{ user }}", &s).unwrap_err(),
        ExpressionError::Syntax { .. }
    ));
    assert_eq!(
        resolve("{{ $env.HOME }}", &s).unwrap_err(),
        ExpressionError::UnknownRoot("$env".to_string())
    );
}

#[test]
fn test_malformed_templates() {
    assert!(matches!(
        Template::parse("Hi {{ $json.user.name").unwrap_err(),
        ExpressionError::Syntax { position: 3, .. }
    ));
    assert!(matches!(
        resolve("{{ }}", &scope()).unwrap_err(),
        ExpressionError::Syntax { .. }
    ));
}

#[test]
fn test_resolve_value_walks_nested_parameters() {
    let parameters = json!({
        "url": "https://api.example/{{ $context.tenantId }}/users",
        "headers": { "{{ not.a.key }}": "{{ $json.user.name }}" },
        "retries": 3,
        "tags": ["{{ $config.greeting }}", "static"],
    });
    let resolved = resolve_value(&parameters, &scope()).unwrap();
    assert_eq!(resolved["url"], json!("https://api.example/acme/users"));
    assert_eq!(resolved["headers"]["{{ not.a.key }}"], json!("Ada"));
    assert_eq!(resolved["retries"], json!(3));
    assert_eq!(resolved["tags"], json!(["Hello", "static"]));
}
