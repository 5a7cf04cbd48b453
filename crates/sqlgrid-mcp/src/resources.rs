//! The resource operation set: URI-addressed read-only data views.
//!
//! Three fixed URIs: the connection listing, per-connection liveness
//! status, and a best-effort schema listing for one connection. Schema
//! introspection never hard-fails the call; backends without
//! `information_schema` get a placeholder row instead.

use serde::Serialize;
use serde_json::{json, Value};

use sqlgrid_pool::QueryResult;

use crate::protocol::{JsonRpcResponse, INTERNAL_ERROR, INVALID_PARAMS};
use crate::McpHandler;

/// URIs of every readable resource, as advertised by `capabilities`.
pub const RESOURCE_URIS: [&str; 3] = [
    "connections://list",
    "connections://status",
    "schema://info",
];

/// Best-effort schema probe. Works on backends with a standard
/// `information_schema`; everything else falls back to the placeholder.
const SCHEMA_QUERY: &str = "SELECT table_name FROM information_schema.tables \
     WHERE table_schema NOT IN ('information_schema', 'performance_schema', 'mysql', 'sys') \
     LIMIT 100";

/// Catalogue entry returned by `resources/list`.
#[derive(Debug, Serialize)]
struct Resource {
    uri: &'static str,
    name: &'static str,
    description: &'static str,
    #[serde(rename = "mimeType")]
    mime_type: &'static str,
}

fn catalogue() -> Vec<Resource> {
    vec![
        Resource {
            uri: "connections://list",
            name: "Database Connections",
            description: "List all active database connections",
            mime_type: "application/json",
        },
        Resource {
            uri: "connections://status",
            name: "Connection Status",
            description: "Check the health status of database connections",
            mime_type: "application/json",
        },
        Resource {
            uri: "schema://info",
            name: "Schema Information",
            description: "Get database schema information for a connection",
            mime_type: "application/json",
        },
    ]
}

impl McpHandler {
    pub(crate) fn handle_resources_list(&self, id: Value) -> JsonRpcResponse {
        JsonRpcResponse::success(id, json!({ "resources": catalogue() }))
    }

    pub(crate) async fn handle_resources_read(
        &self,
        id: Value,
        params: Option<Value>,
    ) -> JsonRpcResponse {
        let invalid = |id, detail: String| {
            JsonRpcResponse::failure(id, INVALID_PARAMS, "Invalid params", Some(json!(detail)))
        };

        let Some(params) = params.as_ref().and_then(Value::as_object) else {
            return invalid(id, "params must be an object".to_string());
        };
        let Some(uri) = params.get("uri").and_then(Value::as_str) else {
            return invalid(id, "uri is required".to_string());
        };

        match uri {
            "connections://list" => self.read_connections_list(id).await,
            "connections://status" => self.read_connections_status(id).await,
            "schema://info" => {
                let Some(connection_id) = params.get("connection_id").and_then(Value::as_str)
                else {
                    return invalid(id, "connection_id is required for schema info".to_string());
                };
                self.read_schema_info(id, connection_id).await
            }
            other => invalid(id, format!("unknown resource URI: {other}")),
        }
    }

    async fn read_connections_list(&self, id: Value) -> JsonRpcResponse {
        let listing = self.pool.list().await;
        match serde_json::to_string_pretty(&listing) {
            Ok(text) => JsonRpcResponse::success(id, contents("connections://list", text)),
            Err(err) => internal(id, err),
        }
    }

    async fn read_connections_status(&self, id: Value) -> JsonRpcResponse {
        let listing = self.pool.list().await;
        let mut status = serde_json::Map::new();
        for connection_id in listing.keys() {
            let entry = match self.pool.check(connection_id).await {
                Ok(()) => json!({ "healthy": true, "error": null }),
                Err(err) => json!({ "healthy": false, "error": err.to_string() }),
            };
            status.insert(connection_id.clone(), entry);
        }
        match serde_json::to_string_pretty(&status) {
            Ok(text) => JsonRpcResponse::success(id, contents("connections://status", text)),
            Err(err) => internal(id, err),
        }
    }

    async fn read_schema_info(&self, id: Value, connection_id: &str) -> JsonRpcResponse {
        let connection = match self.pool.get(connection_id).await {
            Ok(connection) => connection,
            Err(_) => {
                return JsonRpcResponse::failure(
                    id,
                    INVALID_PARAMS,
                    "Invalid params",
                    Some(json!(format!("connection not found: {connection_id}"))),
                );
            }
        };

        let result = match connection
            .query(SCHEMA_QUERY, &[], self.request_timeout)
            .await
        {
            Ok(result) => result,
            // Not every backend exposes information_schema; answer with a
            // placeholder rather than failing the whole read.
            Err(_) => placeholder_schema(),
        };

        match serde_json::to_string_pretty(&result) {
            Ok(text) => JsonRpcResponse::success(id, contents("schema://info", text)),
            Err(err) => internal(id, err),
        }
    }
}

fn placeholder_schema() -> QueryResult {
    QueryResult {
        columns: vec!["note".to_string()],
        column_types: vec!["text".to_string()],
        rows: vec![vec![json!(
            "Schema information not available for this database type"
        )]],
    }
}

fn contents(uri: &str, text: String) -> Value {
    json!({
        "contents": [{
            "uri": uri,
            "mimeType": "application/json",
            "text": text,
        }],
    })
}

fn internal(id: Value, err: impl ToString) -> JsonRpcResponse {
    JsonRpcResponse::failure(
        id,
        INTERNAL_ERROR,
        "Internal error",
        Some(json!(err.to_string())),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{JsonRpcRequest, JSONRPC_VERSION};
    use sqlgrid_drivers::DriverRegistry;
    use sqlgrid_pool::{ConnectionPool, PoolOptions};
    use std::sync::Arc;
    use std::time::Duration;

    fn handler() -> McpHandler {
        let pool = Arc::new(ConnectionPool::new(
            Arc::new(DriverRegistry::with_defaults()),
            PoolOptions::default(),
        ));
        McpHandler::new(pool, Duration::from_secs(5))
    }

    fn read(params: Value) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: "resources/read".to_string(),
            params: Some(params),
            id: Some(json!(1)),
        }
    }

    fn content_text(response: &JsonRpcResponse) -> String {
        response.result.as_ref().unwrap()["contents"][0]["text"]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn resources_list_matches_the_fixed_catalogue() {
        let handler = handler();
        let response = handler.handle_resources_list(json!(1));
        let resources = response.result.unwrap()["resources"]
            .as_array()
            .unwrap()
            .clone();
        let uris: Vec<&str> = resources
            .iter()
            .map(|r| r["uri"].as_str().unwrap())
            .collect();
        assert_eq!(uris, RESOURCE_URIS);
        for resource in &resources {
            assert_eq!(resource["mimeType"], "application/json");
        }
    }

    #[tokio::test]
    async fn read_requires_a_uri() {
        let handler = handler();
        let response = handler.handle(read(json!({}))).await;
        let error = response.error.unwrap();
        assert_eq!(error.code, INVALID_PARAMS);
        assert_eq!(error.data.unwrap(), json!("uri is required"));
    }

    #[tokio::test]
    async fn unknown_uri_is_invalid_params() {
        let handler = handler();
        let response = handler
            .handle(read(json!({"uri": "secrets://all"})))
            .await;
        let error = response.error.unwrap();
        assert_eq!(error.code, INVALID_PARAMS);
        assert_eq!(error.data.unwrap(), json!("unknown resource URI: secrets://all"));
    }

    #[tokio::test]
    async fn connections_list_snapshot_reflects_the_pool() {
        let handler = handler();
        let empty = handler
            .handle(read(json!({"uri": "connections://list"})))
            .await;
        let text = content_text(&empty);
        assert_eq!(text.trim(), "{}");

        handler.pool.create("a", "sqlite://:memory:").await.unwrap();
        let response = handler
            .handle(read(json!({"uri": "connections://list"})))
            .await;
        let listing: serde_json::Value =
            serde_json::from_str(&content_text(&response)).unwrap();
        assert_eq!(listing["a"]["driver"], "sqlite");
        assert_eq!(listing["a"]["id"], "a");
    }

    #[tokio::test]
    async fn connections_status_probes_every_connection() {
        let handler = handler();
        handler.pool.create("a", "sqlite://:memory:").await.unwrap();
        handler.pool.create("b", "sqlite://:memory:").await.unwrap();

        let response = handler
            .handle(read(json!({"uri": "connections://status"})))
            .await;
        let status: serde_json::Value =
            serde_json::from_str(&content_text(&response)).unwrap();
        assert_eq!(status["a"]["healthy"], true);
        assert_eq!(status["a"]["error"], json!(null));
        assert_eq!(status["b"]["healthy"], true);
    }

    #[tokio::test]
    async fn schema_info_requires_connection_id() {
        let handler = handler();
        let response = handler.handle(read(json!({"uri": "schema://info"}))).await;
        let error = response.error.unwrap();
        assert_eq!(error.code, INVALID_PARAMS);
        assert_eq!(
            error.data.unwrap(),
            json!("connection_id is required for schema info")
        );
    }

    #[tokio::test]
    async fn schema_info_for_unknown_connection_is_invalid_params() {
        let handler = handler();
        let response = handler
            .handle(read(json!({"uri": "schema://info", "connection_id": "ghost"})))
            .await;
        let error = response.error.unwrap();
        assert_eq!(error.code, INVALID_PARAMS);
        assert_eq!(error.data.unwrap(), json!("connection not found: ghost"));
    }

    #[tokio::test]
    async fn schema_info_falls_back_when_introspection_is_unsupported() {
        let handler = handler();
        handler.pool.create("a", "sqlite://:memory:").await.unwrap();

        // SQLite has no information_schema, so the probe fails and the
        // placeholder row comes back instead of an error.
        let response = handler
            .handle(read(json!({"uri": "schema://info", "connection_id": "a"})))
            .await;
        assert!(response.error.is_none());
        let result: QueryResult = serde_json::from_str(&content_text(&response)).unwrap();
        assert_eq!(result.columns, vec!["note"]);
        assert_eq!(
            result.rows[0][0],
            json!("Schema information not available for this database type")
        );
    }
}
