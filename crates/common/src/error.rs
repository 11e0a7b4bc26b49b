use thiserror::Error;

/// Common error types for bdxnet
#[derive(Debug, Error)]
pub enum BdxNetError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Connection timeout")]
    Timeout,

    #[error("Connection refused")]
    ConnectionRefused,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for bdxnet operations
pub type Result<T> = std::result::Result<T, BdxNetError>;

impl BdxNetError {
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }
}
