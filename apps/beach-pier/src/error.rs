use thiserror::Error;

/// Reasons an inbound frame could not be turned into a [`ClientMessage`].
///
/// [`ClientMessage`]: crate::protocol::ClientMessage
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("binary frame is not valid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("invalid signaling message: {0}")]
    InvalidMessage(#[from] serde_json::Error),
    #[error("unknown message type {0:?}")]
    UnknownType(String),
    #[error("message is missing required field `{0}`")]
    MissingField(&'static str),
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("outbound queue is full")]
    QueueFull,
    #[error("connection is closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid listen address {addr}: {source}")]
    InvalidListenAddr {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("outbound buffer must hold at least one message")]
    ZeroOutboundBuffer,
}
