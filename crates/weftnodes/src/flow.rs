use async_trait::async_trait;
use serde_json::{json, Value as Json};
use weftcore::{is_truthy, Handler, HandlerError, HandlerOutput, StepContext};

/// Follows output 0 when `condition` is truthy and output 1 otherwise.
/// `$json` passes through unchanged.
pub struct ConditionHandler;

#[async_trait]
impl Handler for ConditionHandler {
    async fn handle(&self, ctx: StepContext) -> Result<HandlerOutput, HandlerError> {
        let condition = ctx.parameters.require("condition")?;
        let branch = if is_truthy(condition) { 0 } else { 1 };
        tracing::debug!("Condition on {} took branch {}", ctx.node_name, branch);
        Ok(HandlerOutput::branch(ctx.input, branch))
    }

    fn description(&self) -> &str {
        "Branch on a boolean expression (0 = true, 1 = false)"
    }
}

/// Terminal response. The run stops after the wave this node is in.
///
/// Output is `{status, body}`; `body` defaults to `$json`, `status` to 200
/// (500 for `respond.error`).
pub struct RespondHandler;

#[async_trait]
impl Handler for RespondHandler {
    async fn handle(&self, ctx: StepContext) -> Result<HandlerOutput, HandlerError> {
        let default_status = if ctx.operation() == "error" { 500 } else { 200 };
        let status = ctx
            .parameters
            .get_u64_in("status", 100..=599)?
            .unwrap_or(default_status);
        let body = ctx
            .parameters
            .get("body")
            .cloned()
            .unwrap_or_else(|| ctx.input.clone());

        ctx.events.info(format!("Responding with status {}", status));
        Ok(HandlerOutput::respond(json!({ "status": status, "body": body })))
    }

    fn description(&self) -> &str {
        "Finish the run with a response payload"
    }
}

/// Publishes `data` (default `$json`) under the name given by `event` and
/// passes `$json` on.
pub struct EmitEventHandler;

#[async_trait]
impl Handler for EmitEventHandler {
    async fn handle(&self, ctx: StepContext) -> Result<HandlerOutput, HandlerError> {
        let name = ctx.parameters.require_str("event")?.to_string();
        let data = ctx
            .parameters
            .get("data")
            .cloned()
            .unwrap_or_else(|| ctx.input.clone());

        ctx.events.data(name, data);
        Ok(HandlerOutput::new(ctx.input))
    }

    fn description(&self) -> &str {
        "Fire-and-forget event"
    }
}

/// Checks `$json` against `required` field names and optional `types`
/// (`{field: "string" | "number" | "boolean" | "object" | "array"}`).
pub struct ValidateFieldsHandler;

#[async_trait]
impl Handler for ValidateFieldsHandler {
    async fn handle(&self, ctx: StepContext) -> Result<HandlerOutput, HandlerError> {
        let Json::Object(object) = &ctx.input else {
            return Err(HandlerError::type_mismatch("$json", "object", &ctx.input));
        };

        let required = ctx.parameters.get_string_list("required").unwrap_or_default();
        let missing: Vec<&str> = required
            .iter()
            .map(String::as_str)
            .filter(|field| object.get(*field).map_or(true, Json::is_null))
            .collect();
        if !missing.is_empty() {
            return Err(HandlerError::Validation(format!(
                "missing required field(s): {}",
                missing.join(", ")
            )));
        }

        if let Some(Json::Object(types)) = ctx.parameters.get("types") {
            for (field, expected) in types {
                let (Some(expected), Some(actual)) = (expected.as_str(), object.get(field)) else {
                    continue;
                };
                if weftcore::json_type_name(actual) != expected {
                    return Err(HandlerError::type_mismatch(field.as_str(), expected, actual));
                }
            }
        }

        Ok(HandlerOutput::new(ctx.input))
    }

    fn description(&self) -> &str {
        "Field-level checks on $json"
    }
}
