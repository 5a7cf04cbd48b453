//! JSON-RPC 2.0 envelope types, validation, and the method router.
//!
//! Every response is either a result or an error, never both; the request
//! id is echoed verbatim, and `null` stands in when the id could not be
//! recovered from malformed input.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::McpHandler;

/// The only supported JSON-RPC version tag.
pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol revision advertised by `initialize`.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Method prefix reserved for protocol-internal use.
const RESERVED_METHOD_PREFIX: &str = "rpc.";

// Fixed JSON-RPC error codes.
pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

/// An inbound JSON-RPC 2.0 request.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub id: Option<Value>,
}

/// An outbound JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

/// The error object of a failed response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn failure(id: Value, code: i64, message: &str, data: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.to_string(),
                data,
            }),
            id,
        }
    }
}

impl McpHandler {
    /// Handle a raw request body. Structurally unparseable input becomes a
    /// `ParseError` response with a null id; this never returns an `Err`.
    pub async fn handle_raw(&self, body: &[u8]) -> JsonRpcResponse {
        let request: JsonRpcRequest = match serde_json::from_slice(body) {
            Ok(request) => request,
            Err(err) => {
                debug!(error = %err, "unparseable request body");
                return JsonRpcResponse::failure(
                    Value::Null,
                    PARSE_ERROR,
                    "Parse error",
                    Some(json!(err.to_string())),
                );
            }
        };
        self.handle(request).await
    }

    /// Validate the envelope and route to the named method.
    pub async fn handle(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone().unwrap_or(Value::Null);

        if let Err(reason) = validate_request(&request) {
            return JsonRpcResponse::failure(
                id,
                INVALID_REQUEST,
                "Invalid Request",
                Some(json!(reason)),
            );
        }

        debug!(method = %request.method, "dispatching request");
        match request.method.as_str() {
            "initialize" => self.handle_initialize(id),
            "capabilities" => self.handle_capabilities(id),
            "tools/list" => self.handle_tools_list(id),
            "tools/call" => self.handle_tools_call(id, request.params).await,
            "resources/list" => self.handle_resources_list(id),
            "resources/read" => self.handle_resources_read(id, request.params).await,
            _ => JsonRpcResponse::failure(id, METHOD_NOT_FOUND, "Method not found", None),
        }
    }

    /// Static protocol-capability description. Push-style capabilities
    /// (`subscribe`, `listChanged`) are always advertised as disabled.
    fn handle_initialize(&self, id: Value) -> JsonRpcResponse {
        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": {
                    "resources": {
                        "subscribe": false,
                        "listChanged": false,
                    },
                    "tools": {},
                },
                "serverInfo": {
                    "name": "sqlgridd",
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        )
    }

    /// The fixed lists of supported tool and resource names.
    fn handle_capabilities(&self, id: Value) -> JsonRpcResponse {
        JsonRpcResponse::success(
            id,
            json!({
                "tools": crate::tools::TOOL_NAMES,
                "resources": crate::resources::RESOURCE_URIS,
            }),
        )
    }
}

/// Envelope validation applied before any routing.
fn validate_request(request: &JsonRpcRequest) -> Result<(), String> {
    if request.jsonrpc != JSONRPC_VERSION {
        return Err(format!("invalid JSON-RPC version: {}", request.jsonrpc));
    }
    if request.method.is_empty() {
        return Err("missing method".to_string());
    }
    if request.method.starts_with(RESERVED_METHOD_PREFIX) {
        return Err(format!(
            "method name cannot start with {RESERVED_METHOD_PREFIX:?}"
        ));
    }
    Ok(())
}
