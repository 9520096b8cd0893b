//! mcp-search-server - MCP Server for chat-search
//!
//! Exposes conversational search via the Model Context Protocol (MCP) as a
//! single `search_conversations` tool.

use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chat_search::{ConversationSearch, SearchRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

pub const SEARCH_TOOL: &str = "search_conversations";

/// Fatal precondition failure (missing token or caller identity)
pub const FATAL_ERROR: i32 = -32001;
/// Non-fatal search failure
pub const SEARCH_ERROR: i32 = -32000;
pub const INVALID_PARAMS: i32 = -32602;
pub const METHOD_NOT_FOUND: i32 = -32601;

/// MCP JSON-RPC request
#[derive(Debug, Deserialize)]
pub struct McpRequest {
    #[serde(default)]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Value,
}

/// MCP JSON-RPC response
#[derive(Debug, Serialize, Deserialize)]
pub struct McpResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
    pub id: Value,
}

impl McpResponse {
    fn success(id: Value, result: Value) -> Json<Self> {
        Json(Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        })
    }

    fn failure(id: Value, code: i32, message: impl Into<String>) -> Json<Self> {
        Json(Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(McpError {
                code,
                message: message.into(),
            }),
            id,
        })
    }
}

/// MCP error
#[derive(Debug, Serialize, Deserialize)]
pub struct McpError {
    pub code: i32,
    pub message: String,
}

/// Tool definition
#[derive(Debug, Serialize)]
struct Tool {
    name: String,
    description: String,
    parameters: Vec<ToolParameter>,
    server: String,
}

#[derive(Debug, Serialize)]
struct ToolParameter {
    name: String,
    description: String,
    #[serde(rename = "type")]
    param_type: String,
    required: bool,
}

impl ToolParameter {
    fn optional(name: &str, param_type: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            param_type: param_type.to_string(),
            required: false,
        }
    }
}

/// Application state
pub struct AppState {
    pub engine: ConversationSearch,
}

/// Build the HTTP router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/mcp", post(mcp_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "mcp-search-server",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// MCP endpoint handler
async fn mcp_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<McpRequest>,
) -> Json<McpResponse> {
    debug!("MCP request: method={}", request.method);

    match request.method.as_str() {
        "tools/list" => handle_tools_list(request.id),
        "tools/call" => handle_tools_call(&state, request).await,
        _ => McpResponse::failure(
            request.id,
            METHOD_NOT_FOUND,
            format!("Method not found: {}", request.method),
        ),
    }
}

/// Handle tools/list
fn handle_tools_list(id: Value) -> Json<McpResponse> {
    debug!("Listing available tools");

    let tools = vec![Tool {
        name: SEARCH_TOOL.to_string(),
        description: "Search Slack conversations with given people and/or in a channel, \
                      optionally about a topic. Returns matching messages with their thread \
                      or surrounding messages, newest first."
            .to_string(),
        parameters: vec![
            ToolParameter::optional(
                "emails",
                "array",
                "Email addresses of the people the conversations should involve",
            ),
            ToolParameter::optional("topic", "string", "Keywords to search for"),
            ToolParameter::optional("channel", "string", "Channel to search in (e.g. #general)"),
            ToolParameter::optional(
                "time_range",
                "string",
                "One of latest, today, yesterday, last_7d, last_30d, all (default: latest)",
            ),
            ToolParameter::optional("limit", "number", "Maximum number of results"),
        ],
        server: "slack".to_string(),
    }];

    match serde_json::to_value(tools) {
        Ok(tools) => McpResponse::success(id, tools),
        Err(e) => McpResponse::failure(id, SEARCH_ERROR, e.to_string()),
    }
}

/// Handle tools/call
async fn handle_tools_call(state: &AppState, request: McpRequest) -> Json<McpResponse> {
    let id = request.id;

    let Some(tool_name) = request.params.get("name").and_then(Value::as_str) else {
        return McpResponse::failure(id, INVALID_PARAMS, "Missing tool name");
    };

    if tool_name != SEARCH_TOOL {
        return McpResponse::failure(
            id,
            METHOD_NOT_FOUND,
            format!("Tool not found: {}", tool_name),
        );
    }

    let arguments = request
        .params
        .get("arguments")
        .cloned()
        .unwrap_or_else(|| Value::Object(Default::default()));

    let search: SearchRequest = match serde_json::from_value(arguments) {
        Ok(search) => search,
        Err(e) => {
            return McpResponse::failure(id, INVALID_PARAMS, format!("Invalid arguments: {}", e))
        }
    };

    debug!("Calling {} with {:?}", SEARCH_TOOL, search);

    match state.engine.search(search).await {
        Ok(result) => {
            info!("{} returned {} message(s)", SEARCH_TOOL, result.messages.len());
            match serde_json::to_value(&result) {
                Ok(value) => McpResponse::success(id, value),
                Err(e) => McpResponse::failure(id, SEARCH_ERROR, e.to_string()),
            }
        }
        Err(e) if e.is_fatal() => {
            warn!("{} failed: {}", SEARCH_TOOL, e);
            McpResponse::failure(id, FATAL_ERROR, e.to_string())
        }
        Err(e) => {
            warn!("{} failed: {}", SEARCH_TOOL, e);
            McpResponse::failure(id, SEARCH_ERROR, e.to_string())
        }
    }
}
