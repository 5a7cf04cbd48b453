//! Server regression tests.
//!
//! Drives the full HTTP surface: health endpoint, JSON-RPC envelope
//! handling over `/mcp`, the tool lifecycle, and the route/CORS gates.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use sqlgrid_drivers::DriverRegistry;
use sqlgrid_mcp::build_router;
use sqlgrid_pool::{ConnectionPool, PoolOptions};

fn test_pool() -> Arc<ConnectionPool> {
    Arc::new(ConnectionPool::new(
        Arc::new(DriverRegistry::with_defaults()),
        PoolOptions::default(),
    ))
}

fn test_router(pool: Arc<ConnectionPool>, enable_mcp: bool, enable_cors: bool) -> Router {
    build_router(pool, Duration::from_secs(5), enable_mcp, enable_cors)
}

fn rpc(method: &str, params: Value) -> Request<Body> {
    let body = json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 1,
    });
    Request::builder()
        .method(Method::POST)
        .uri("/mcp")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_endpoint_reports_pool_size() {
    let pool = test_pool();
    pool.create("a", "sqlite://:memory:").await.unwrap();
    let router = test_router(pool, true, true);

    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let health = body_json(resp).await;
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["connections"], 1);
    assert!(health["timestamp"].as_str().unwrap().contains('T'));
}

#[tokio::test]
async fn initialize_round_trips_over_http() {
    let router = test_router(test_pool(), true, true);

    let resp = router.oneshot(rpc("initialize", json!({}))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(resp).await;
    assert_eq!(body["jsonrpc"], "2.0");
    assert_eq!(body["id"], 1);
    assert_eq!(body["result"]["protocolVersion"], "2024-11-05");
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn garbage_body_yields_parse_error_with_null_id() {
    let router = test_router(test_pool(), true, true);

    let req = Request::builder()
        .method(Method::POST)
        .uri("/mcp")
        .header("content-type", "application/json")
        .body(Body::from("{this is not json"))
        .unwrap();
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(resp).await;
    assert_eq!(body["error"]["code"], -32700);
    assert_eq!(body["id"], Value::Null);
}

#[tokio::test]
async fn wrong_protocol_version_is_invalid_request() {
    let router = test_router(test_pool(), true, true);

    let req = Request::builder()
        .method(Method::POST)
        .uri("/mcp")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"jsonrpc": "1.9", "method": "initialize", "id": 5}).to_string(),
        ))
        .unwrap();
    let resp = router.oneshot(req).await.unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["error"]["code"], -32600);
    assert_eq!(body["id"], 5);
}

#[tokio::test]
async fn tool_lifecycle_over_http() {
    let pool = test_pool();
    let router = test_router(pool.clone(), true, true);

    let create = rpc(
        "tools/call",
        json!({
            "name": "create_connection",
            "arguments": {"connection_id": "a", "dsn": "sqlite3://:memory:"},
        }),
    );
    let resp = router.clone().oneshot(create).await.unwrap();
    let body = body_json(resp).await;
    assert!(body.get("error").is_none(), "create failed: {body}");
    assert_eq!(pool.size().await, 1);

    let query = rpc(
        "tools/call",
        json!({
            "name": "execute_query",
            "arguments": {"connection_id": "a", "query": "SELECT 1 AS one"},
        }),
    );
    let resp = router.clone().oneshot(query).await.unwrap();
    let body = body_json(resp).await;
    let text = body["result"]["content"][0]["text"].as_str().unwrap();
    let result: Value = serde_json::from_str(text).unwrap();
    assert_eq!(result["columns"], json!(["one"]));
    assert_eq!(result["rows"], json!([[1]]));

    let close = rpc(
        "tools/call",
        json!({"name": "close_connection", "arguments": {"connection_id": "a"}}),
    );
    let resp = router.oneshot(close).await.unwrap();
    let body = body_json(resp).await;
    assert!(body.get("error").is_none());
    assert_eq!(pool.size().await, 0);
}

#[tokio::test]
async fn mcp_route_absent_when_disabled() {
    let router = test_router(test_pool(), false, true);

    let resp = router.oneshot(rpc("initialize", json!({}))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn get_on_mcp_is_method_not_allowed() {
    let router = test_router(test_pool(), true, false);

    let req = Request::builder()
        .uri("/mcp")
        .body(Body::empty())
        .unwrap();
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn cors_preflight_is_answered_when_enabled() {
    let router = test_router(test_pool(), true, true);

    let req = Request::builder()
        .method(Method::OPTIONS)
        .uri("/mcp")
        .header("origin", "https://example.com")
        .header("access-control-request-method", "POST")
        .body(Body::empty())
        .unwrap();
    let resp = router.oneshot(req).await.unwrap();
    assert!(resp.status().is_success());
    assert!(resp.headers().contains_key("access-control-allow-origin"));
}

#[tokio::test]
async fn slow_query_is_cut_off_by_the_request_timeout() {
    let pool = test_pool();
    let router = build_router(pool.clone(), Duration::from_millis(100), true, false);

    pool.create("a", "sqlite://:memory:").await.unwrap();

    // Unbounded recursive CTE; only the timeout stops it.
    let query = rpc(
        "tools/call",
        json!({
            "name": "execute_query",
            "arguments": {
                "connection_id": "a",
                "query": "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) \
                          SELECT count(*) FROM c",
            },
        }),
    );
    let resp = router.oneshot(query).await.unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["error"]["code"], -32603);
    let data = body["error"]["data"].as_str().unwrap();
    assert!(data.contains("timed out"), "unexpected data: {data}");

    // The connection itself stays usable afterwards.
    let conn = pool.get("a").await.unwrap();
    let result = conn
        .query("SELECT 1 AS one", &[], Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(result.rows, vec![vec![json!(1)]]);
}

#[tokio::test]
async fn unknown_method_over_http_is_method_not_found() {
    let router = test_router(test_pool(), true, true);

    let resp = router
        .oneshot(rpc("subscriptions/create", json!({})))
        .await
        .unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["error"]["code"], -32601);
}
