/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer went away before the operation completed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Writing a frame to the peer failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Reading a frame from the peer failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding the listener or completing the WebSocket upgrade failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),
}

impl TransportError {
    /// Wraps a WebSocket protocol error as an I/O error of the given kind.
    #[cfg(feature = "websocket")]
    pub(crate) fn io(
        kind: std::io::ErrorKind,
        err: tokio_tungstenite::tungstenite::Error,
    ) -> std::io::Error {
        std::io::Error::new(kind, err)
    }
}
