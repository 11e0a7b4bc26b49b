/// Directory daemon RPC
///
/// - The session client that keeps the master node list, block height and
///   LNS lookups in sync with the directory daemon
/// - The transport and router seams it is written against
/// - A length-prefixed TCP transport implementing the transport seam

pub mod client;
pub mod framed;

pub use client::DirectoryClient;
pub use framed::{Frame, FrameKind, FramedTransport};

use crate::identity::RouterId;
use async_trait::async_trait;
use bdxnet_common::{BdxNetError, PeerStats};
use std::fmt;
use std::sync::Arc;

/// Handle of an open transport connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Handler for a daemon-initiated command
///
/// Returns the reply parts for requests; the return value of a handler
/// invoked for a plain command is discarded.
pub type InboundHandler = Arc<dyn Fn(Vec<String>) -> Option<Vec<String>> + Send + Sync>;

/// Called with the id of a connection once it has closed
pub type DisconnectHandler = Arc<dyn Fn(ConnectionId) + Send + Sync>;

/// Request/reply messaging to the directory daemon
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Open a connection to `address`
    async fn connect(&self, address: &str) -> bdxnet_common::Result<ConnectionId>;

    /// Send a request and wait for its reply parts
    async fn request(
        &self,
        conn: ConnectionId,
        command: &str,
        args: Vec<String>,
    ) -> bdxnet_common::Result<Vec<String>>;

    /// Send a command that gets no reply
    async fn command(
        &self,
        conn: ConnectionId,
        command: &str,
        args: Vec<String>,
    ) -> bdxnet_common::Result<()>;

    /// Route inbound `command` messages to `handler`
    fn register_handler(&self, command: &str, handler: InboundHandler);

    /// Get told about every connection that closes, whichever side closed it
    fn register_disconnect(&self, handler: DisconnectHandler);
}

/// What the directory client needs from the router that owns it
pub trait Router: Send + Sync {
    /// Restrict outbound connections to these relays
    fn set_router_whitelist(&self, routers: Vec<RouterId>);

    /// Connection statistics for a relay, if the router knows it
    fn peer_stats(&self, router_id: &RouterId) -> Option<PeerStats>;
}

/// Directory client errors
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Not connected to the directory daemon")]
    NotConnected,

    #[error("Transport error: {0}")]
    Transport(#[from] BdxNetError),

    #[error("Request timed out")]
    Timeout,

    #[error("Directory daemon returned status {0}")]
    Status(String),

    #[error("Malformed reply: {0}")]
    MalformedReply(String),

    #[error("Invalid identity key: {0}")]
    InvalidKey(String),

    #[error("Runtime shut down")]
    RuntimeGone,
}
