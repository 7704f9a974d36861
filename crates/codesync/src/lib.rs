//! # CodeSync
//!
//! Real-time collaborative code editing server.
//!
//! Participants connect over WebSocket, join a room by an opaque string
//! id, and share one editable buffer per room. Every edit is applied to
//! the room's authoritative state and broadcast to the other members;
//! empty rooms are kept for a grace window so a reconnecting participant
//! finds their code where they left it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use codesync::prelude::*;
//!
//! # async fn start() -> Result<(), CodesyncError> {
//! let server = CodesyncServer::builder()
//!     .bind("0.0.0.0:3001")
//!     .build(ProcessExecutor::new())
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
pub mod gateway;
mod handler;
mod server;

pub use error::CodesyncError;
pub use gateway::{GatewayHandle, GatewayStats, SessionGateway, spawn_gateway};
pub use server::{
    CodesyncServer, CodesyncServerBuilder, DEFAULT_BIND_ADDR, DEFAULT_PING_INTERVAL,
    DEFAULT_PING_TIMEOUT, DEFAULT_STATS_INTERVAL, ServerConfig,
};

pub mod prelude {
    //! Everything needed to start a server or write a client test.

    pub use crate::{CodesyncError, CodesyncServer, CodesyncServerBuilder, ServerConfig};
    pub use codesync_exec::{ExecutionResult, Executor, ProcessExecutor};
    pub use codesync_protocol::{
        Channel, ClientMessage, CursorPosition, Envelope, LanguageTag, OutputKind, OutputLine,
        ParticipantId, RoomId, ServerMessage,
    };
    pub use codesync_room::{DEFAULT_GRACE_WINDOW, RoomConfig};
}
