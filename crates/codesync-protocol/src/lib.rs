//! Wire protocol for CodeSync.
//!
//! This crate defines the messages exchanged between the browser client
//! and the server:
//!
//! - **Types** ([`Envelope`], [`ClientMessage`], [`ServerMessage`],
//!   [`RoomId`], [`LanguageTag`], ...): what travels on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those messages are
//!   converted to and from bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Gateway (rooms, fan-out)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    Channel, ClientMessage, CursorPosition, Envelope, LanguageTag, OutputKind, OutputLine,
    ParticipantId, RoomId, ServerMessage,
};
