//! sqlgrid-mcp — the protocol layer in front of the connection pool.
//!
//! Decodes inbound JSON-RPC 2.0 requests, validates the envelope, routes to
//! the fixed method vocabulary (`initialize`, `capabilities`, `tools/*`,
//! `resources/*`), and wraps every outcome in a well-formed success or error
//! envelope. The handler is stateless apart from the injected pool and the
//! per-request timeout; one call handles exactly one request.

pub mod http;
pub mod protocol;
pub mod resources;
pub mod tools;

use std::sync::Arc;
use std::time::Duration;

use sqlgrid_pool::ConnectionPool;

pub use http::{build_router, AppState};
pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use tools::ToolCall;

/// Handles MCP requests against an injected connection pool.
pub struct McpHandler {
    pub(crate) pool: Arc<ConnectionPool>,
    pub(crate) request_timeout: Duration,
}

impl McpHandler {
    pub fn new(pool: Arc<ConnectionPool>, request_timeout: Duration) -> Self {
        Self {
            pool,
            request_timeout,
        }
    }
}
