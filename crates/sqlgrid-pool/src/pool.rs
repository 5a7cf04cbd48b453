//! Connection pool: exclusive ownership and bookkeeping of live connections.
//!
//! The pool owns the only mapping from connection IDs to live handles. All
//! mutation (insert on create, remove on close, drain on shutdown) happens
//! under the write half of a single `RwLock`; reads share the read half, so
//! a reader can never observe a half-inserted or half-removed entry. Each
//! connection's own metadata is guarded independently, keeping bookkeeping
//! on one connection from contending with operations on another.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::driver::{DriverResolver, Handle};
use crate::dsn::Dsn;
use crate::error::{PoolError, PoolResult};
use crate::types::{ConnectionInfo, QueryResult, StatementResult};

/// Limits and timeouts the pool consumes; owned by process configuration.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Ceiling on simultaneously open connections.
    pub max_connections: usize,
    /// Timeout for backend I/O issued by the pool itself (open, ping).
    pub operation_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_connections: 100,
            operation_timeout: Duration::from_secs(30),
        }
    }
}

/// A single live database connection: the exclusively owned handle plus
/// display metadata and usage bookkeeping.
pub struct Connection {
    id: String,
    driver: &'static str,
    dsn: Dsn,
    handle: Box<dyn Handle>,
    created: DateTime<Utc>,
    last_used: Mutex<DateTime<Utc>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("driver", &self.driver)
            .field("created", &self.created)
            .finish_non_exhaustive()
    }
}

impl Connection {
    fn new(id: String, driver: &'static str, dsn: Dsn, handle: Box<dyn Handle>) -> Self {
        let now = Utc::now();
        Self {
            id,
            driver,
            dsn,
            handle,
            created: now,
            last_used: Mutex::new(now),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Read-only metadata snapshot for listings.
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id.clone(),
            driver: self.driver.to_string(),
            host: self.dsn.host().to_string(),
            database: self.dsn.database().to_string(),
            created: self.created,
            last_used: *lock_unpoisoned(&self.last_used),
        }
    }

    fn touch(&self) {
        *lock_unpoisoned(&self.last_used) = Utc::now();
    }

    /// Execute a row-returning query, eagerly materializing the result.
    pub async fn query(
        &self,
        sql: &str,
        args: &[serde_json::Value],
        timeout: Duration,
    ) -> PoolResult<QueryResult> {
        self.touch();
        with_timeout(timeout, self.handle.query(sql, args)).await
    }

    /// Execute a non-query statement.
    pub async fn execute(
        &self,
        sql: &str,
        args: &[serde_json::Value],
        timeout: Duration,
    ) -> PoolResult<StatementResult> {
        self.touch();
        with_timeout(timeout, self.handle.exec(sql, args)).await
    }

    async fn ping(&self, timeout: Duration) -> PoolResult<()> {
        self.touch();
        with_timeout(timeout, self.handle.ping()).await
    }

    async fn close_handle(&self) -> PoolResult<()> {
        self.handle.close().await
    }
}

/// Owns the set of live connections and enforces identity uniqueness and
/// the capacity ceiling. One instance per server process.
pub struct ConnectionPool {
    connections: RwLock<HashMap<String, Arc<Connection>>>,
    resolver: Arc<dyn DriverResolver>,
    options: PoolOptions,
}

impl ConnectionPool {
    pub fn new(resolver: Arc<dyn DriverResolver>, options: PoolOptions) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            resolver,
            options,
        }
    }

    /// Open a new connection under `id` and insert it into the pool.
    ///
    /// The write lock is held across the duplicate check, capacity check,
    /// open, liveness probe, and insert, so two racing creates can never
    /// both succeed for one id and no create can push the pool past its
    /// ceiling mid-insert. A handle opened before a probe failure is closed
    /// before the error returns.
    pub async fn create(&self, id: &str, dsn: &str) -> PoolResult<Arc<Connection>> {
        let mut connections = self.connections.write().await;

        if connections.contains_key(id) {
            return Err(PoolError::DuplicateId(id.to_string()));
        }
        if connections.len() >= self.options.max_connections {
            return Err(PoolError::CapacityExceeded(self.options.max_connections));
        }

        let dsn = Dsn::parse(dsn)?;
        let driver = self
            .resolver
            .driver_for(dsn.scheme())
            .ok_or_else(|| PoolError::UnsupportedScheme(dsn.scheme().to_string()))?;

        let handle = with_timeout(self.options.operation_timeout, driver.open(&dsn)).await?;

        if let Err(err) = with_timeout(self.options.operation_timeout, handle.ping()).await {
            if let Err(close_err) = handle.close().await {
                warn!(%id, error = %close_err, "failed to close handle after probe failure");
            }
            return Err(err);
        }

        let connection = Arc::new(Connection::new(
            id.to_string(),
            driver.name(),
            dsn,
            handle,
        ));
        connections.insert(id.to_string(), connection.clone());
        info!(%id, driver = connection.driver, "connection created");
        Ok(connection)
    }

    /// Look up a connection by id, bumping its last-used timestamp.
    ///
    /// The returned `Arc` is shared; the pool hands out no exclusive lease.
    pub async fn get(&self, id: &str) -> PoolResult<Arc<Connection>> {
        let connections = self.connections.read().await;
        let connection = connections
            .get(id)
            .cloned()
            .ok_or_else(|| PoolError::NotFound(id.to_string()))?;
        connection.touch();
        Ok(connection)
    }

    /// Close the handle under `id` and remove the entry.
    ///
    /// The write lock is held until the handle has finished closing, so a
    /// concurrent `get` is never handed a connection that is mid-close. Once
    /// this returns, the id is gone until a later `create` reuses it.
    pub async fn close(&self, id: &str) -> PoolResult<()> {
        let mut connections = self.connections.write().await;
        let connection = connections
            .remove(id)
            .ok_or_else(|| PoolError::NotFound(id.to_string()))?;
        if let Err(err) = connection.close_handle().await {
            warn!(%id, error = %err, "error closing handle");
        }
        info!(%id, "connection closed");
        Ok(())
    }

    /// Snapshot of every connection's display metadata, taken under the
    /// read lock. Safe to hand to callers outside the lock; never exposes
    /// a live handle.
    pub async fn list(&self) -> BTreeMap<String, ConnectionInfo> {
        let connections = self.connections.read().await;
        connections
            .iter()
            .map(|(id, connection)| (id.clone(), connection.info()))
            .collect()
    }

    /// Probe the connection under `id` for liveness.
    ///
    /// A failed probe is advisory: the connection stays in the pool until
    /// the caller closes it explicitly.
    pub async fn check(&self, id: &str) -> PoolResult<()> {
        let connection = {
            let connections = self.connections.read().await;
            connections
                .get(id)
                .cloned()
                .ok_or_else(|| PoolError::NotFound(id.to_string()))?
        };
        // Probe outside the lock; a slow backend must not stall the pool.
        connection.ping(self.options.operation_timeout).await
    }

    /// Close every connection and empty the pool. Best-effort: keeps going
    /// past individual close failures and reports the last one.
    pub async fn close_all(&self) -> PoolResult<()> {
        let mut connections = self.connections.write().await;
        let mut last_err = None;
        for (id, connection) in connections.drain() {
            if let Err(err) = connection.close_handle().await {
                warn!(%id, error = %err, "error closing handle during shutdown");
                last_err = Some(err);
            }
        }
        debug!("connection pool drained");
        match last_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Current number of live connections.
    pub async fn size(&self) -> usize {
        self.connections.read().await.len()
    }
}

/// Run `op` under `limit`, mapping elapsed time to [`PoolError::Timeout`].
async fn with_timeout<T>(limit: Duration, op: impl Future<Output = PoolResult<T>>) -> PoolResult<T> {
    match tokio::time::timeout(limit, op).await {
        Ok(result) => result,
        Err(_) => Err(PoolError::Timeout(limit)),
    }
}

/// The guarded value is a plain timestamp, so a poisoned lock only means a
/// writer panicked mid-assignment of a `Copy` value; recover the guard.
fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
