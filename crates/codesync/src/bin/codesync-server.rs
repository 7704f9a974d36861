//! CodeSync server.
//!
//! # Configuration
//!
//! Environment variables:
//! - `CODESYNC_ADDR`: Address to listen on (default: 0.0.0.0:3001)
//! - `CODESYNC_EXEC_TIMEOUT_SECS`: Wall-clock limit for code runs
//!   (default: 10)
//! - `RUST_LOG`: Log filter (default: info)

use std::time::Duration;

use codesync::prelude::*;
use codesync::DEFAULT_BIND_ADDR;
use codesync_exec::DEFAULT_TIMEOUT;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Settings read from the environment.
#[derive(Debug, Clone)]
struct Config {
    addr: String,
    exec_timeout: Duration,
}

impl Config {
    fn from_env() -> Self {
        let addr = std::env::var("CODESYNC_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());

        let exec_timeout = std::env::var("CODESYNC_EXEC_TIMEOUT_SECS")
            .ok()
            .and_then(|secs| secs.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);

        Self { addr, exec_timeout }
    }
}

#[tokio::main]
async fn main() -> Result<(), CodesyncError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tracing::info!(addr = %config.addr, exec_timeout = ?config.exec_timeout, "starting");

    let executor = ProcessExecutor::new().with_timeout(config.exec_timeout);
    let server = CodesyncServer::builder()
        .bind(&config.addr)
        .build(executor)
        .await?;

    tracing::info!(addr = %server.local_addr()?, "listening");
    server.run().await
}
