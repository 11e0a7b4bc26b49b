/// Length-prefixed JSON framing over TCP
///
/// Every frame is a 4-byte little-endian length followed by a JSON encoded
/// [`Frame`]. Each connection gets a reader task that routes replies to
/// pending requests and inbound messages to registered handlers, and a
/// writer task fed through a channel.

use super::{ConnectionId, DisconnectHandler, InboundHandler, MessageTransport};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use bdxnet_common::rpc::MAX_FRAME_SIZE;
use bdxnet_common::{BdxNetError, ClientConfig, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    Request,
    Reply,
    Command,
}

/// One message on the wire
///
/// Replies carry the id of the request they answer and an empty command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub id: u64,
    pub kind: FrameKind,
    pub command: String,
    pub data: Vec<String>,
}

impl Frame {
    pub fn request(id: u64, command: impl Into<String>, data: Vec<String>) -> Self {
        Self {
            id,
            kind: FrameKind::Request,
            command: command.into(),
            data,
        }
    }

    pub fn reply(id: u64, data: Vec<String>) -> Self {
        Self {
            id,
            kind: FrameKind::Reply,
            command: String::new(),
            data,
        }
    }

    pub fn command(command: impl Into<String>, data: Vec<String>) -> Self {
        Self {
            id: 0,
            kind: FrameKind::Command,
            command: command.into(),
            data,
        }
    }
}

/// Write a frame
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &Frame) -> Result<()> {
    let serialized =
        serde_json::to_vec(frame).map_err(|e| BdxNetError::serialization(e.to_string()))?;

    if serialized.len() > MAX_FRAME_SIZE {
        return Err(BdxNetError::protocol(format!(
            "Frame too large: {} bytes (max {})",
            serialized.len(),
            MAX_FRAME_SIZE
        )));
    }

    writer
        .write_all(&(serialized.len() as u32).to_le_bytes())
        .await?;
    writer.write_all(&serialized).await?;
    writer.flush().await?;

    debug!("Sent {:?} frame {} ({} bytes)", frame.kind, frame.command, serialized.len());
    Ok(())
}

/// Read a frame, `None` once the stream is closed
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Frame>> {
    let mut len_buf = [0u8; 4];
    if let Err(e) = reader.read_exact(&mut len_buf).await {
        debug!("Stream closed or error reading length: {}", e);
        return Ok(None);
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        error!("Frame too large: {} bytes (max {})", len, MAX_FRAME_SIZE);
        return Err(BdxNetError::protocol("Frame too large"));
    }

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data).await?;

    let frame: Frame =
        serde_json::from_slice(&data).map_err(|e| BdxNetError::serialization(e.to_string()))?;

    debug!("Received {:?} frame {} ({} bytes)", frame.kind, frame.command, len);
    Ok(Some(frame))
}

type PendingReplies = Arc<DashMap<u64, oneshot::Sender<Vec<String>>>>;

struct ConnectionState {
    outbound: mpsc::UnboundedSender<Frame>,
    pending: PendingReplies,
}

/// [`MessageTransport`] over TCP
pub struct FramedTransport {
    connections: Arc<DashMap<ConnectionId, ConnectionState>>,
    handlers: Arc<DashMap<String, InboundHandler>>,
    disconnect_handlers: Arc<ArcSwap<Vec<DisconnectHandler>>>,
    next_connection: AtomicU64,
    next_request: AtomicU64,
    request_timeout: Duration,
}

impl FramedTransport {
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
            handlers: Arc::new(DashMap::new()),
            disconnect_handlers: Arc::new(ArcSwap::from_pointee(Vec::new())),
            next_connection: AtomicU64::new(1),
            next_request: AtomicU64::new(1),
            request_timeout,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.request_timeout())
    }

    /// Number of open connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn connection(&self, conn: ConnectionId) -> Result<(mpsc::UnboundedSender<Frame>, PendingReplies)> {
        let state = self.connections.get(&conn).ok_or(BdxNetError::NotConnected)?;
        Ok((state.outbound.clone(), state.pending.clone()))
    }

    /// Send a request on a connection whose state was already looked up and
    /// wait for the reply
    async fn exchange(
        &self,
        conn: ConnectionId,
        outbound: mpsc::UnboundedSender<Frame>,
        pending: PendingReplies,
        command: &str,
        args: Vec<String>,
    ) -> Result<Vec<String>> {
        let id = self.next_request.fetch_add(1, Ordering::Relaxed);

        let (tx, rx) = oneshot::channel();
        pending.insert(id, tx);

        // The reader drops the connection before clearing its pending map, so
        // an entry that missed the clear is caught here
        if !self.connections.contains_key(&conn) {
            pending.remove(&id);
            return Err(BdxNetError::ConnectionClosed);
        }

        if outbound.send(Frame::request(id, command, args)).is_err() {
            pending.remove(&id);
            return Err(BdxNetError::ConnectionClosed);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(data)) => Ok(data),
            Ok(Err(_)) => Err(BdxNetError::ConnectionClosed),
            Err(_) => {
                pending.remove(&id);
                Err(BdxNetError::Timeout)
            }
        }
    }
}

async fn run_reader<R: AsyncRead + Unpin>(
    conn: ConnectionId,
    mut reader: R,
    outbound: mpsc::UnboundedSender<Frame>,
    pending: PendingReplies,
    handlers: Arc<DashMap<String, InboundHandler>>,
) {
    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                warn!("Dropping {} after bad frame: {}", conn, e);
                break;
            }
        };

        match frame.kind {
            FrameKind::Reply => match pending.remove(&frame.id) {
                Some((_, tx)) => {
                    let _ = tx.send(frame.data);
                }
                None => debug!("Reply {} on {} matches no request", frame.id, conn),
            },
            FrameKind::Request => {
                let handler = handlers.get(&frame.command).map(|h| h.value().clone());
                let data = match handler {
                    Some(handler) => handler(frame.data).unwrap_or_default(),
                    None => {
                        warn!("No handler for request {}", frame.command);
                        vec![json!({ "error": "unknown command" }).to_string()]
                    }
                };
                if outbound.send(Frame::reply(frame.id, data)).is_err() {
                    break;
                }
            }
            FrameKind::Command => {
                let handler = handlers.get(&frame.command).map(|h| h.value().clone());
                match handler {
                    Some(handler) => {
                        handler(frame.data);
                    }
                    None => debug!("Ignoring command {}", frame.command),
                }
            }
        }
    }
}

#[async_trait]
impl MessageTransport for FramedTransport {
    async fn connect(&self, address: &str) -> Result<ConnectionId> {
        let stream = TcpStream::connect(address)
            .await
            .map_err(|e| BdxNetError::network(format!("{}: {}", address, e)))?;
        stream.set_nodelay(true)?;

        let conn = ConnectionId(self.next_connection.fetch_add(1, Ordering::Relaxed));
        let (reader, mut writer) = stream.into_split();
        let (outbound, mut rx) = mpsc::unbounded_channel::<Frame>();
        let pending: PendingReplies = Arc::new(DashMap::new());

        self.connections.insert(
            conn,
            ConnectionState {
                outbound: outbound.clone(),
                pending: pending.clone(),
            },
        );

        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if let Err(e) = write_frame(&mut writer, &frame).await {
                    warn!("Failed to write frame on {}: {}", conn, e);
                    break;
                }
            }
        });

        let connections = self.connections.clone();
        let handlers = self.handlers.clone();
        let disconnect_handlers = self.disconnect_handlers.clone();
        tokio::spawn(async move {
            run_reader(conn, reader, outbound, pending.clone(), handlers).await;
            connections.remove(&conn);
            // Fails every request still waiting on this connection
            pending.clear();
            info!("Connection {} closed", conn);

            for handler in disconnect_handlers.load().iter() {
                handler(conn);
            }
        });

        info!("Opened {} to {}", conn, address);
        Ok(conn)
    }

    async fn request(
        &self,
        conn: ConnectionId,
        command: &str,
        args: Vec<String>,
    ) -> Result<Vec<String>> {
        let (outbound, pending) = self.connection(conn)?;
        self.exchange(conn, outbound, pending, command, args).await
    }

    async fn command(&self, conn: ConnectionId, command: &str, args: Vec<String>) -> Result<()> {
        let (outbound, _) = self.connection(conn)?;
        outbound
            .send(Frame::command(command, args))
            .map_err(|_| BdxNetError::ConnectionClosed)
    }

    fn register_handler(&self, command: &str, handler: InboundHandler) {
        self.handlers.insert(command.to_string(), handler);
    }

    fn register_disconnect(&self, handler: DisconnectHandler) {
        self.disconnect_handlers.rcu(|handlers| {
            let mut handlers = Vec::clone(handlers);
            handlers.push(handler.clone());
            handlers
        });
    }
}
