//! Driver capability traits.
//!
//! The pool never talks to a database library directly. It depends on these
//! traits and receives concrete implementations (and the scheme resolver)
//! by constructor injection, so the core stays backend-agnostic.

use async_trait::async_trait;
use std::sync::Arc;

use crate::dsn::Dsn;
use crate::error::PoolResult;
use crate::types::{QueryResult, StatementResult};

/// A database backend capable of opening handles for a parsed DSN.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Canonical driver name (e.g. "sqlite", "postgres"), used for display.
    fn name(&self) -> &'static str;

    /// Open a live handle against the backend described by `dsn`.
    async fn open(&self, dsn: &Dsn) -> PoolResult<Box<dyn Handle>>;
}

/// An open, backend-specific database handle.
///
/// Implementations must support concurrent use: the pool hands shared
/// references to multiple callers and only serializes its own bookkeeping.
#[async_trait]
pub trait Handle: Send + Sync {
    /// Liveness probe.
    async fn ping(&self) -> PoolResult<()>;

    /// Execute a row-returning query, materializing the full result set.
    async fn query(&self, sql: &str, args: &[serde_json::Value]) -> PoolResult<QueryResult>;

    /// Execute a non-query statement.
    async fn exec(&self, sql: &str, args: &[serde_json::Value]) -> PoolResult<StatementResult>;

    /// Close the handle. Later calls on the same handle fail with
    /// [`PoolError::Closed`](crate::error::PoolError::Closed).
    async fn close(&self) -> PoolResult<()>;
}

/// Resolves a DSN scheme to a registered [`Driver`].
///
/// Implemented by the driver registry; injected into the pool so that the
/// set of linked backends is a deployment decision, not a pool concern.
pub trait DriverResolver: Send + Sync {
    /// The driver for `scheme`, or `None` when no backend is registered.
    fn driver_for(&self, scheme: &str) -> Option<Arc<dyn Driver>>;
}
