//! The tool operation set: catalogue, argument validation, execution.
//!
//! `tools/call` parameters are validated exactly once at the protocol
//! boundary into a [`ToolCall`] variant carrying typed arguments; the
//! execution path below never re-inspects untyped JSON.

use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::protocol::{JsonRpcResponse, INTERNAL_ERROR, INVALID_PARAMS};
use crate::McpHandler;

/// Names of every callable tool, as advertised by `capabilities`.
pub const TOOL_NAMES: [&str; 4] = [
    "execute_query",
    "create_connection",
    "close_connection",
    "execute_statement",
];

/// A validated `tools/call` invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    ExecuteQuery {
        connection_id: String,
        query: String,
        args: Vec<Value>,
    },
    CreateConnection {
        connection_id: String,
        dsn: String,
    },
    CloseConnection {
        connection_id: String,
    },
    ExecuteStatement {
        connection_id: String,
        statement: String,
        args: Vec<Value>,
    },
}

impl ToolCall {
    /// Validate `tools/call` params into a typed invocation. The error
    /// string becomes the `data` field of an `InvalidParams` response.
    pub fn parse(params: Option<&Value>) -> Result<Self, String> {
        let params = params
            .and_then(Value::as_object)
            .ok_or_else(|| "params must be an object".to_string())?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| "name is required".to_string())?;

        let arguments = params
            .get("arguments")
            .and_then(Value::as_object)
            .ok_or_else(|| "arguments is required".to_string())?;

        let required = |key: &str| -> Result<String, String> {
            arguments
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| format!("{key} is required"))
        };
        let optional_args = || -> Vec<Value> {
            arguments
                .get("args")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
        };

        match name {
            "execute_query" => Ok(ToolCall::ExecuteQuery {
                connection_id: required("connection_id")?,
                query: required("query")?,
                args: optional_args(),
            }),
            "create_connection" => Ok(ToolCall::CreateConnection {
                connection_id: required("connection_id")?,
                dsn: required("dsn")?,
            }),
            "close_connection" => Ok(ToolCall::CloseConnection {
                connection_id: required("connection_id")?,
            }),
            "execute_statement" => Ok(ToolCall::ExecuteStatement {
                connection_id: required("connection_id")?,
                statement: required("statement")?,
                args: optional_args(),
            }),
            other => Err(format!("unknown tool: {other}")),
        }
    }
}

/// Catalogue entry returned by `tools/list`.
#[derive(Debug, Serialize)]
struct Tool {
    name: &'static str,
    description: &'static str,
    #[serde(rename = "inputSchema")]
    input_schema: Value,
}

fn catalogue() -> Vec<Tool> {
    vec![
        Tool {
            name: "execute_query",
            description: "Execute a SQL query on a database connection",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "connection_id": {
                        "type": "string",
                        "description": "The ID of the database connection to use",
                    },
                    "query": {
                        "type": "string",
                        "description": "The SQL query to execute",
                    },
                    "args": {
                        "type": "array",
                        "description": "Optional query arguments for parameterized queries",
                        "items": {"type": "string"},
                    },
                },
                "required": ["connection_id", "query"],
            }),
        },
        Tool {
            name: "create_connection",
            description: "Create a new database connection",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "connection_id": {
                        "type": "string",
                        "description": "A unique identifier for the connection",
                    },
                    "dsn": {
                        "type": "string",
                        "description": "The database connection string (DSN)",
                    },
                },
                "required": ["connection_id", "dsn"],
            }),
        },
        Tool {
            name: "close_connection",
            description: "Close an existing database connection",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "connection_id": {
                        "type": "string",
                        "description": "The ID of the connection to close",
                    },
                },
                "required": ["connection_id"],
            }),
        },
        Tool {
            name: "execute_statement",
            description: "Execute a SQL statement (INSERT, UPDATE, DELETE, etc.)",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "connection_id": {
                        "type": "string",
                        "description": "The ID of the database connection to use",
                    },
                    "statement": {
                        "type": "string",
                        "description": "The SQL statement to execute",
                    },
                    "args": {
                        "type": "array",
                        "description": "Optional statement arguments for parameterized statements",
                        "items": {"type": "string"},
                    },
                },
                "required": ["connection_id", "statement"],
            }),
        },
    ]
}

/// A tool execution failure, already mapped to its protocol error.
struct ToolFailure {
    code: i64,
    message: &'static str,
    data: Option<Value>,
}

impl ToolFailure {
    fn internal(message: &'static str, detail: impl ToString) -> Self {
        Self {
            code: INTERNAL_ERROR,
            message,
            data: Some(json!(detail.to_string())),
        }
    }

    fn invalid_params(detail: impl ToString) -> Self {
        Self {
            code: INVALID_PARAMS,
            message: "Invalid params",
            data: Some(json!(detail.to_string())),
        }
    }
}

impl McpHandler {
    pub(crate) fn handle_tools_list(&self, id: Value) -> JsonRpcResponse {
        JsonRpcResponse::success(id, json!({ "tools": catalogue() }))
    }

    pub(crate) async fn handle_tools_call(
        &self,
        id: Value,
        params: Option<Value>,
    ) -> JsonRpcResponse {
        let call = match ToolCall::parse(params.as_ref()) {
            Ok(call) => call,
            Err(reason) => {
                return JsonRpcResponse::failure(
                    id,
                    INVALID_PARAMS,
                    "Invalid params",
                    Some(json!(reason)),
                );
            }
        };

        match self.run_tool(call).await {
            Ok(text) => JsonRpcResponse::success(id, text_content(text)),
            Err(failure) => {
                JsonRpcResponse::failure(id, failure.code, failure.message, failure.data)
            }
        }
    }

    async fn run_tool(&self, call: ToolCall) -> Result<String, ToolFailure> {
        match call {
            ToolCall::ExecuteQuery {
                connection_id,
                query,
                args,
            } => {
                let connection = self.pool.get(&connection_id).await.map_err(|_| {
                    ToolFailure::invalid_params(format!("connection not found: {connection_id}"))
                })?;
                let result = connection
                    .query(&query, &args, self.request_timeout)
                    .await
                    .map_err(|err| {
                        warn!(%connection_id, error = %err, "query failed");
                        ToolFailure::internal("Query execution failed", err)
                    })?;
                pretty(&result)
            }
            ToolCall::CreateConnection { connection_id, dsn } => {
                self.pool
                    .create(&connection_id, &dsn)
                    .await
                    .map_err(|err| {
                        warn!(%connection_id, error = %err, "connection creation failed");
                        ToolFailure::internal("Connection creation failed", err)
                    })?;
                Ok(format!("Successfully created connection: {connection_id}"))
            }
            ToolCall::CloseConnection { connection_id } => {
                self.pool.close(&connection_id).await.map_err(|err| {
                    ToolFailure::internal("Connection close failed", err)
                })?;
                Ok(format!("Successfully closed connection: {connection_id}"))
            }
            ToolCall::ExecuteStatement {
                connection_id,
                statement,
                args,
            } => {
                let connection = self.pool.get(&connection_id).await.map_err(|_| {
                    ToolFailure::invalid_params(format!("connection not found: {connection_id}"))
                })?;
                let result = connection
                    .execute(&statement, &args, self.request_timeout)
                    .await
                    .map_err(|err| {
                        warn!(%connection_id, error = %err, "statement failed");
                        ToolFailure::internal("Statement execution failed", err)
                    })?;
                pretty(&result)
            }
        }
    }
}

/// Wrap tool output in the protocol's content envelope.
fn text_content(text: String) -> Value {
    json!({
        "content": [{
            "type": "text",
            "text": text,
        }],
    })
}

fn pretty<T: Serialize>(value: &T) -> Result<String, ToolFailure> {
    serde_json::to_string_pretty(value)
        .map_err(|err| ToolFailure::internal("Internal error", err))
}
