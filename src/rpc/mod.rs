//! C6 — JSON-RPC 2.0 handler. Single or batch requests; `id`-bearing
//! requests get a response, `id`-less notifications get none. Parse
//! failure yields a single `id: null` envelope with code −32700
//! (spec.md §4.6).

use crate::config::SUPPORTED_PROTOCOL_VERSIONS;
use crate::error::RoomError;
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::room::Room;
use crate::tools::{DispatchContext, ToolRegistry};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub id: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self { jsonrpc: "2.0", result: Some(result), error: None, id }
    }

    fn err(id: Value, error: &RoomError) -> Self {
        Self {
            jsonrpc: "2.0",
            result: None,
            error: Some(JsonRpcError {
                code: error.to_jsonrpc_code(),
                message: error.to_string(),
                data: serde_json::to_value(error).ok(),
            }),
            id,
        }
    }

    pub fn parse_error() -> Self {
        Self {
            jsonrpc: "2.0",
            result: None,
            error: Some(JsonRpcError { code: -32700, message: "parse error".to_string(), data: None }),
            id: Value::Null,
        }
    }
}

/// `true` for requests that must receive a response (they carry an `id`);
/// JSON-RPC notifications (no `id`) are processed but never answered.
fn expects_response(request: &JsonRpcRequest) -> bool {
    request.id.is_some()
}

#[allow(clippy::too_many_arguments)]
pub async fn dispatch_one(
    room: &Room,
    registry: &ToolRegistry,
    rate_limiter: &RateLimiter,
    rate_limit_config: &RateLimitConfig,
    ctx: &DispatchContext,
    request: JsonRpcRequest,
) -> Option<JsonRpcResponse> {
    let id = request.id.clone().unwrap_or(Value::Null);
    let wants_reply = expects_response(&request);
    let params = request.params.unwrap_or(Value::Null);

    let result = match request.method.as_str() {
        "initialize" => handle_initialize(room, registry, ctx, &params),
        "notifications/initialized" => Ok(Value::Null),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({
            "tools": registry
                .list_tools(&ctx.mode)
                .into_iter()
                .map(|spec| json!({
                    "name": spec.name,
                    "description": spec.description,
                    "category": spec.category,
                    "required": spec.required_fields,
                }))
                .collect::<Vec<_>>()
        })),
        "tools/call" => {
            let name = params.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
            let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
            match check_rate_limit(registry, rate_limiter, rate_limit_config, ctx, &name) {
                Ok(()) => registry.dispatch(room, ctx, &name, &arguments).await,
                Err(e) => Err(e),
            }
        }
        other => Err(RoomError::MethodNotFound { name: other.to_string() }),
    };

    if !wants_reply {
        return None;
    }
    Some(match result {
        Ok(value) => JsonRpcResponse::ok(id, value),
        Err(e) => JsonRpcResponse::err(id, &e),
    })
}

/// C9 rate-limit gate: looks up the tool's category, applies the role
/// multiplier, and checks the sliding window keyed on `(agent, category)`.
/// Tools not reachable without an identified agent fall back to the `"*"`
/// key so an anonymous caller still gets a (shared) bucket.
fn check_rate_limit(
    registry: &ToolRegistry,
    rate_limiter: &RateLimiter,
    rate_limit_config: &RateLimitConfig,
    ctx: &DispatchContext,
    tool_name: &str,
) -> Result<(), RoomError> {
    let Some(category) = registry.category_of(tool_name) else {
        return Ok(());
    };
    let agent = ctx.agent.as_deref().unwrap_or("*");
    let (max, window_secs) = rate_limit_config.effective(category, ctx.role);
    let key = format!("{agent}:{category:?}");
    let info = rate_limiter.check(&key, max, window_secs);
    if info.allowed {
        Ok(())
    } else {
        Err(RoomError::RateLimited { retry_after_s: info.retry_after_secs })
    }
}

fn handle_initialize(
    room: &Room,
    registry: &ToolRegistry,
    ctx: &DispatchContext,
    params: &Value,
) -> Result<Value, RoomError> {
    let requested = params.get("protocolVersion").and_then(Value::as_str);
    let negotiated = match requested {
        Some(v) if SUPPORTED_PROTOCOL_VERSIONS.contains(&v) => v.to_string(),
        Some(v) => return Err(RoomError::UnsupportedProtocolVersion { version: v.to_string() }),
        None => room.config.protocol_version_default.clone(),
    };
    Ok(json!({
        "protocolVersion": negotiated,
        "serverInfo": { "name": "masc-room", "version": env!("CARGO_PKG_VERSION") },
        "capabilities": { "tools": {}, "logging": {} },
        "tools": registry.list_tools(&ctx.mode).iter().map(|s| s.name).collect::<Vec<_>>(),
    }))
}

/// Parses a single-or-batch JSON-RPC request body and dispatches each
/// entry; returns `None` for a body that is entirely notifications.
pub async fn handle_body(
    room: &Room,
    registry: &ToolRegistry,
    rate_limiter: &RateLimiter,
    rate_limit_config: &RateLimitConfig,
    ctx: &DispatchContext,
    body: &str,
) -> Option<Value> {
    let parsed: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return Some(serde_json::to_value(JsonRpcResponse::parse_error()).unwrap()),
    };

    if let Some(batch) = parsed.as_array() {
        let mut responses = Vec::new();
        for entry in batch {
            let request: JsonRpcRequest = match serde_json::from_value(entry.clone()) {
                Ok(r) => r,
                Err(_) => {
                    responses.push(serde_json::to_value(JsonRpcResponse::parse_error()).unwrap());
                    continue;
                }
            };
            if let Some(response) = dispatch_one(room, registry, rate_limiter, rate_limit_config, ctx, request).await
            {
                responses.push(serde_json::to_value(response).unwrap());
            }
        }
        if responses.is_empty() {
            return None;
        }
        return Some(Value::Array(responses));
    }

    let request: JsonRpcRequest = match serde_json::from_value(parsed) {
        Ok(r) => r,
        Err(_) => return Some(serde_json::to_value(JsonRpcResponse::parse_error()).unwrap()),
    };
    dispatch_one(room, registry, rate_limiter, rate_limit_config, ctx, request)
        .await
        .map(|r| serde_json::to_value(r).unwrap())
}
