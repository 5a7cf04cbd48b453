//! sqlgrid-pool — named database connections behind driver capability traits.
//!
//! The pool is the single choke point for creating, sharing, and tearing
//! down live database connections. It depends only on the [`driver`]
//! capability traits; concrete backends are registered by the caller and
//! injected at construction, so the core never links a database library.
//!
//! # Architecture
//!
//! [`ConnectionPool`] maps caller-chosen string IDs to [`Connection`]s
//! behind a writer-exclusive lock. A [`Connection`] exclusively owns its
//! backend handle; callers share `Arc<Connection>` references and the
//! backend handle is expected to tolerate concurrent use.

pub mod driver;
pub mod dsn;
pub mod error;
pub mod pool;
pub mod types;

pub use driver::{Driver, DriverResolver, Handle};
pub use dsn::Dsn;
pub use error::{PoolError, PoolResult};
pub use pool::{Connection, ConnectionPool, PoolOptions};
pub use types::{ConnectionInfo, QueryResult, StatementResult};
