//! `CodesyncServer` builder and server loop.
//!
//! This is the entry point for running a CodeSync server. It ties
//! together all the layers: transport → protocol → gateway → rooms.

use std::sync::Arc;
use std::time::Duration;

use codesync_exec::Executor;
use codesync_protocol::{Codec, JsonCodec};
use codesync_room::RoomConfig;
use codesync_transport::{Transport, WebSocketTransport};

use crate::CodesyncError;
use crate::gateway::{GatewayHandle, spawn_gateway};
use crate::handler::handle_connection;

/// Address the server binds to unless told otherwise.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";

/// How often each connection is sent a WebSocket Ping.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(25);

/// How long past a missed Pong a connection is kept before it is dropped.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(20);

/// How often connection and room counts are logged.
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: String,

    /// Grace window and default language for rooms.
    pub room: RoomConfig,

    /// Liveness probing. A connection is dropped once the peer has sent
    /// no frame at all, Pongs included, for `ping_interval + ping_timeout`.
    /// Clients that stay silent at the application level are unaffected.
    pub ping_interval: Duration,
    pub ping_timeout: Duration,

    pub stats_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            room: RoomConfig::default(),
            ping_interval: DEFAULT_PING_INTERVAL,
            ping_timeout: DEFAULT_PING_TIMEOUT,
            stats_interval: DEFAULT_STATS_INTERVAL,
        }
    }
}

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) gateway: GatewayHandle,
    pub(crate) codec: C,
    pub(crate) ping_interval: Duration,
    pub(crate) ping_timeout: Duration,
}

/// Builder for configuring and starting a CodeSync server.
///
/// # Example
///
/// ```rust,no_run
/// use codesync::prelude::*;
///
/// # async fn start() -> Result<(), CodesyncError> {
/// let server = CodesyncServer::builder()
///     .bind("127.0.0.1:3001")
///     .build(ProcessExecutor::new())
///     .await?;
/// server.run().await
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct CodesyncServerBuilder {
    config: ServerConfig,
}

impl CodesyncServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets how long empty rooms are kept.
    pub fn grace_window(mut self, grace: Duration) -> Self {
        self.config.room.grace_window = grace;
        self
    }

    pub fn room_config(mut self, room: RoomConfig) -> Self {
        self.config.room = room;
        self
    }

    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.config.ping_interval = interval;
        self
    }

    pub fn ping_timeout(mut self, timeout: Duration) -> Self {
        self.config.ping_timeout = timeout;
        self
    }

    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.config.stats_interval = interval;
        self
    }

    /// Replaces every setting at once.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Binds the listener and starts the gateway.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build<E: Executor>(
        self,
        executor: E,
    ) -> Result<CodesyncServer<JsonCodec>, CodesyncError> {
        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;
        let gateway = spawn_gateway(self.config.room, executor, self.config.stats_interval);

        let state = Arc::new(ServerState {
            gateway,
            codec: JsonCodec,
            ping_interval: self.config.ping_interval,
            ping_timeout: self.config.ping_timeout,
        });

        Ok(CodesyncServer { transport, state })
    }
}

/// A bound CodeSync server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct CodesyncServer<C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<C>>,
}

impl CodesyncServer<JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> CodesyncServerBuilder {
        CodesyncServerBuilder::new()
    }
}

impl<C: Codec> CodesyncServer<C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// A handle to the running gateway, for querying stats.
    pub fn gateway(&self) -> GatewayHandle {
        self.state.gateway.clone()
    }

    /// Runs the server accept loop.
    ///
    /// Accepts incoming connections and spawns a handler task for each.
    /// Runs until the process is terminated.
    pub async fn run(mut self) -> Result<(), CodesyncError> {
        tracing::info!(addr = ?self.transport.local_addr().ok(), "CodeSync server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
