/// Errors that can occur in peer operations.
///
/// Transient connection failures are not errors at this layer: they surface
/// as a `Destroyed` event and a `Disconnected` session state. What remains
/// here are setup failures and misuse that has no recovery.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] vidctrl_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] vidctrl_frame::FrameError),

    /// `destroy` was called on a connection that is already torn down.
    #[error("connection already destroyed")]
    AlreadyDestroyed,

    /// A connect completed after the connect timeout had already fired.
    #[error("connected after the connect timeout already disconnected")]
    AlreadyDisconnected,

    /// The operation needs an open connection.
    #[error("not connected")]
    NotConnected,

    /// The session task has stopped.
    #[error("session closed")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, PeerError>;
