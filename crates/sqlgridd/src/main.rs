//! sqlgridd — the sqlgrid daemon.
//!
//! Single binary that assembles the pieces:
//! - Driver registry (SQLite, PostgreSQL)
//! - Connection pool
//! - MCP handler + HTTP router (`POST /mcp`, `GET /health`)
//!
//! # Usage
//!
//! ```text
//! sqlgridd serve --port 8080 --config /etc/sqlgrid/sqlgridd.toml
//! ```

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use sqlgrid_drivers::DriverRegistry;
use sqlgrid_pool::{ConnectionPool, PoolOptions};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "sqlgridd", about = "sqlgrid daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the server.
    Serve {
        /// Address to listen on.
        #[arg(long, default_value = "0.0.0.0")]
        addr: String,

        /// Port to listen on.
        #[arg(long, default_value = "8080")]
        port: u16,

        /// Configuration file path (TOML).
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlgridd=debug,sqlgrid=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { addr, port, config } => run_serve(addr, port, config).await,
    }
}

async fn run_serve(addr: String, port: u16, config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = match &config_path {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    info!(
        max_connections = config.server.max_connections,
        request_timeout = %config.server.request_timeout,
        "sqlgridd starting"
    );

    // Driver registry and connection pool.
    let registry = Arc::new(DriverRegistry::with_defaults());
    let pool = Arc::new(ConnectionPool::new(
        registry,
        PoolOptions {
            max_connections: config.server.max_connections,
            operation_timeout: config.request_timeout(),
        },
    ));

    // HTTP router.
    let router = sqlgrid_mcp::build_router(
        pool.clone(),
        config.request_timeout(),
        config.server.enable_mcp,
        config.server.enable_cors,
    );

    let addr: SocketAddr = format!("{addr}:{port}").parse()?;
    // Failing to bind is the only fatal startup condition.
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "server listening");

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
    });

    server.await?;

    // Close every live database connection before exit.
    if let Err(err) = pool.close_all().await {
        warn!(error = %err, "error closing connection pool");
    }

    info!("sqlgridd stopped");
    Ok(())
}
