use async_trait::async_trait;
use serde_json::{Map, Value as Json};
use weftcore::{Handler, HandlerError, HandlerOutput, StepContext};

/// Pure reshaping of `$json`.
///
/// `value` replaces the payload outright. Otherwise `set` is merged over an
/// object payload and the keys named in `remove` are dropped from it.
pub struct TransformHandler;

#[async_trait]
impl Handler for TransformHandler {
    async fn handle(&self, ctx: StepContext) -> Result<HandlerOutput, HandlerError> {
        if let Some(value) = ctx.parameters.get("value") {
            return Ok(HandlerOutput::new(value.clone()));
        }

        let mut object = match ctx.input {
            Json::Object(map) => map,
            Json::Null => Map::new(),
            other => return Err(HandlerError::type_mismatch("$json", "object", &other)),
        };

        match ctx.parameters.get("set") {
            Some(Json::Object(fields)) => {
                for (key, value) in fields {
                    object.insert(key.clone(), value.clone());
                }
            }
            Some(other) => return Err(HandlerError::type_mismatch("set", "object", other)),
            None => {}
        }

        for key in ctx.parameters.get_string_list("remove").unwrap_or_default() {
            object.remove(&key);
        }

        Ok(HandlerOutput::new(Json::Object(object)))
    }

    fn description(&self) -> &str {
        "Reshape $json without side effects"
    }
}

/// Parse a JSON string into a value
pub struct JsonParseHandler;

#[async_trait]
impl Handler for JsonParseHandler {
    async fn handle(&self, ctx: StepContext) -> Result<HandlerOutput, HandlerError> {
        let source = match ctx.parameters.get("source") {
            Some(value) => value,
            None => &ctx.input,
        };
        let text = source
            .as_str()
            .ok_or_else(|| HandlerError::type_mismatch("source", "string", source))?;

        let parsed: Json = serde_json::from_str(text)
            .map_err(|e| HandlerError::Validation(format!("JSON parse error: {}", e)))?;

        Ok(HandlerOutput::new(parsed))
    }

    fn description(&self) -> &str {
        "Parse a JSON string"
    }
}
