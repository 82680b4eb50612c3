use async_trait::async_trait;
use serde_json::{json, Map, Value as Json};
use std::time::Duration;
use weftcore::{Handler, HandlerError, HandlerOutput, StepContext};

const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// `proxy.fetch`: one outbound HTTP call with its own timeout.
///
/// Parameters: `url`, `method` (GET), `headers` object, `body` (sent as JSON
/// unless it is a string), `timeoutMs`. Output is `{status, headers, body}`;
/// a JSON response body is parsed, anything else stays text. Connection
/// failures, timeouts and 5xx responses are transient; a request that
/// cannot be built (bad URL or header) is not.
pub struct ProxyFetchHandler {
    client: reqwest::Client,
}

impl ProxyFetchHandler {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ProxyFetchHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for ProxyFetchHandler {
    async fn handle(&self, ctx: StepContext) -> Result<HandlerOutput, HandlerError> {
        let url = ctx.parameters.require_str("url")?;
        let method = ctx.parameters.get_str("method").unwrap_or("GET").to_uppercase();
        let timeout_ms = ctx
            .parameters
            .get_u64_in("timeoutMs", 1..=u64::from(u32::MAX))?
            .unwrap_or(DEFAULT_TIMEOUT_MS);

        ctx.events.info(format!("{} {}", method, url));

        let mut request = match method.as_str() {
            "GET" => self.client.get(url),
            "POST" => self.client.post(url),
            "PUT" => self.client.put(url),
            "PATCH" => self.client.patch(url),
            "DELETE" => self.client.delete(url),
            _ => {
                return Err(HandlerError::Validation(format!(
                    "Unsupported method: {}",
                    method
                )))
            }
        };

        match ctx.parameters.get("body") {
            Some(Json::String(text)) => request = request.body(text.clone()),
            Some(Json::Null) | None => {}
            Some(body) => request = request.json(body),
        }

        if let Some(Json::Object(headers)) = ctx.parameters.get("headers") {
            for (key, value) in headers {
                if let Some(val_str) = value.as_str() {
                    request = request.header(key, val_str);
                }
            }
        }

        ctx.check_cancelled()?;
        let response = request
            .timeout(Duration::from_millis(timeout_ms))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    HandlerError::Timeout { ms: timeout_ms }
                } else if e.is_builder() {
                    HandlerError::Validation(format!("Malformed request: {}", e))
                } else {
                    HandlerError::Transient(format!("HTTP request failed: {}", e))
                }
            })?;

        let status = response.status();
        let headers: Map<String, Json> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v.to_str().unwrap_or(""))))
            .collect();

        let body_text = response
            .text()
            .await
            .map_err(|e| HandlerError::Transient(format!("Failed to read response: {}", e)))?;

        ctx.events.info(format!("Response status: {}", status.as_u16()));

        if status.is_server_error() {
            return Err(HandlerError::Transient(format!(
                "{} {} returned {}",
                method, url, status
            )));
        }

        let body = serde_json::from_str(&body_text).unwrap_or(Json::String(body_text));
        Ok(HandlerOutput::new(json!({
            "status": status.as_u16(),
            "headers": headers,
            "body": body,
        })))
    }

    fn description(&self) -> &str {
        "Make an outbound HTTP request"
    }
}
