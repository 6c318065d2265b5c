//! HTTP facade mapping REST routes onto RPC calls.
//!
//! Each route issues at most one call on the shared [`RpcClient`] and
//! returns the RPC result verbatim as the response body. Any RPC failure
//! surfaces as HTTP 500 with `{"error": <message>}`; unmatched routes as
//! 404. Request bodies are tolerated the way the original bridge tolerates
//! them: an absent or empty body acts as `{}` and missing optional fields
//! are simply not forwarded.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::rpc::client::{RpcClient, RpcError};

/// Build the bridge router.
///
/// `allowed_origin` restricts cross-origin requests; `"*"` permits any
/// origin.
pub fn router(client: Arc<RpcClient>, allowed_origin: &str) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tools", get(list_tools))
        .route("/tools/call", post(call_tool))
        .route("/prompts", get(list_prompts))
        .route("/prompts/run", post(run_prompt))
        .route("/resources", get(list_resources))
        .route("/resources/read", post(read_resource))
        .route("/rpc", post(raw_rpc))
        .fallback(not_found)
        .layer(cors_layer(allowed_origin))
        .with_state(client)
}

fn cors_layer(allowed_origin: &str) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origin == "*" {
        return layer.allow_origin(Any);
    }
    match allowed_origin.parse::<HeaderValue>() {
        Ok(origin) => layer.allow_origin(origin),
        Err(_) => {
            warn!("Invalid CORS origin '{}'; allowing any origin", allowed_origin);
            layer.allow_origin(Any)
        }
    }
}

/// Handler failure: every error leaves as a JSON body.
enum ApiError {
    BadRequest(String),
    Rpc(RpcError),
}

impl From<RpcError> for ApiError {
    fn from(err: RpcError) -> Self {
        ApiError::Rpc(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Rpc(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Parse a request body, treating an empty body as `{}`.
fn parse_body(bytes: &[u8]) -> Result<Value, ApiError> {
    if bytes.is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_slice(bytes)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {}", e)))
}

/// Build `{name, arguments}` params, defaulting `arguments` to `{}` and
/// omitting `name` when the caller did.
fn named_call_params(body: &Value) -> Value {
    let mut params = serde_json::Map::new();
    if let Some(name) = body.get("name") {
        params.insert("name".to_string(), name.clone());
    }
    params.insert(
        "arguments".to_string(),
        body.get("arguments").cloned().unwrap_or_else(|| json!({})),
    );
    Value::Object(params)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_tools(State(client): State<Arc<RpcClient>>) -> Result<Json<Value>, ApiError> {
    Ok(Json(client.call("tools/list", json!({})).await?))
}

async fn call_tool(
    State(client): State<Arc<RpcClient>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let body = parse_body(&body)?;
    Ok(Json(client.call("tools/call", named_call_params(&body)).await?))
}

async fn list_prompts(State(client): State<Arc<RpcClient>>) -> Result<Json<Value>, ApiError> {
    Ok(Json(client.call("prompts/list", json!({})).await?))
}

async fn run_prompt(
    State(client): State<Arc<RpcClient>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let body = parse_body(&body)?;
    Ok(Json(client.call("prompts/run", named_call_params(&body)).await?))
}

async fn list_resources(State(client): State<Arc<RpcClient>>) -> Result<Json<Value>, ApiError> {
    Ok(Json(client.call("resources/list", json!({})).await?))
}

async fn read_resource(
    State(client): State<Arc<RpcClient>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let body = parse_body(&body)?;
    let mut params = serde_json::Map::new();
    if let Some(uri) = body.get("uri") {
        params.insert("uri".to_string(), uri.clone());
    }
    Ok(Json(client.call("resources/read", Value::Object(params)).await?))
}

/// Generic escape hatch: `{method, params}` forwarded as-is.
async fn raw_rpc(
    State(client): State<Arc<RpcClient>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let body = parse_body(&body)?;
    let method = body
        .get("method")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::BadRequest("Missing method".to_string()))?
        .to_string();
    let params = body.get("params").cloned().unwrap_or_else(|| json!({}));
    Ok(Json(client.call(&method, params).await?))
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response()
}
