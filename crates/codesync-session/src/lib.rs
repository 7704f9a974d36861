//! Connection sessions for CodeSync.
//!
//! A session is the server's record of one live connection: the
//! participant it speaks for, the display name it chose, the room it is
//! bound to, and the queue its outbound messages go through.
//!
//! ```text
//! Gateway (above)  ← routes room events to sessions
//!     ↕
//! Session Layer (this crate)  ← who is connected, where to send
//!     ↕
//! Protocol Layer (below)  ← ParticipantId, RoomId, ServerMessage
//! ```
//!
//! Sessions live exactly as long as their connection; nothing here
//! survives a reconnect.

mod error;
mod session;
mod table;

pub use error::SessionError;
pub use session::{OutboundReceiver, OutboundSender, Session, outbound_channel};
pub use table::SessionTable;
