//! sqlgrid-drivers — concrete database backends for the sqlgrid pool.
//!
//! Implements the pool's [`Driver`](sqlgrid_pool::Driver) and
//! [`Handle`](sqlgrid_pool::Handle) capability traits for SQLite (rusqlite)
//! and PostgreSQL (tokio-postgres), and provides the scheme registry the
//! pool uses to resolve a DSN to its backend.

pub mod postgres;
pub mod registry;
pub mod sqlite;

pub use postgres::PostgresDriver;
pub use registry::DriverRegistry;
pub use sqlite::SqliteDriver;
