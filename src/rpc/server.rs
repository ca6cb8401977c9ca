//! Transport Server - accepts device connections
//!
//! One task per connection. Each connection runs its own state machine
//! ([`ConnectionStateMachine`]) and owns the device session it registers;
//! the only shared state is the [`SessionRegistry`].
//!
//! Per connection:
//! - reader loop: splits the byte stream into frames, drives the state machine
//! - writer task: drains the session's outgoing frame channel into the socket
//!
//! A malformed frame is logged and skipped; it never ends the connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::ServerError;
use super::registry::SessionRegistry;
use super::session::{DeviceSession, DEFAULT_CALL_TIMEOUT_SECS};
use super::state::{ConnectionState, ConnectionStateMachine};
use crate::protocol::{encode_frame, FrameCodec, RpcMessage};

/// Default listening port
pub const DEFAULT_PORT: u16 = 11800;

/// Outgoing frame queue depth per connection
const WRITE_QUEUE_DEPTH: usize = 256;

/// Socket read chunk size
const READ_CHUNK: usize = 8192;

/// Device-facing TCP server
pub struct TransportServer {
    listener: TcpListener,
    registry: Arc<SessionRegistry>,
    call_timeout: Duration,
}

impl TransportServer {
    /// Bind the listening socket, e.g. `"0.0.0.0:11800"`.
    pub async fn bind(addr: &str) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        info!("[rpc-server] listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            registry: Arc::new(SessionRegistry::new()),
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
        })
    }

    /// Default timeout given to every session created by this server.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.registry.clone()
    }

    /// Run the accept loop on a background task.
    pub fn spawn(self) -> Result<ServerHandle, ServerError> {
        let local_addr = self.local_addr()?;
        let registry = self.registry();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let task = tokio::spawn(self.serve(shutdown_rx));
        Ok(ServerHandle {
            local_addr,
            registry,
            shutdown_tx,
            task,
        })
    }

    /// Accept connections until a shutdown signal arrives (or its sender is
    /// dropped), then send a kill signal to every registered device.
    pub async fn serve(self, mut shutdown_rx: mpsc::Receiver<()>) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            info!("[rpc-server] connection from {}", peer);
                            let registry = self.registry.clone();
                            let call_timeout = self.call_timeout;
                            tokio::spawn(async move {
                                handle_connection(stream, peer, registry, call_timeout).await;
                            });
                        }
                        Err(e) => {
                            warn!("[rpc-server] accept failed: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("[rpc-server] shutdown signal received");
                    break;
                }
            }
        }

        self.registry.close_all().await;
        debug!("[rpc-server] accept loop ended");
    }
}

/// Handle to a running server
pub struct ServerHandle {
    local_addr: SocketAddr,
    registry: Arc<SessionRegistry>,
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.registry.clone()
    }

    /// Stop accepting, close every session and wait for the accept loop.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            warn!("[rpc-server] accept loop task failed: {}", e);
        }
    }
}

/// What the reader loop does after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// Per-connection protocol handler
struct Connection {
    peer: SocketAddr,
    state: ConnectionStateMachine,
    registry: Arc<SessionRegistry>,
    write_tx: mpsc::Sender<String>,
    call_timeout: Duration,
    session: Option<Arc<DeviceSession>>,
    response_tx: Option<mpsc::UnboundedSender<RpcMessage>>,
}

impl Connection {
    fn new(
        peer: SocketAddr,
        registry: Arc<SessionRegistry>,
        write_tx: mpsc::Sender<String>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            peer,
            state: ConnectionStateMachine::new(),
            registry,
            write_tx,
            call_timeout,
            session: None,
            response_tx: None,
        }
    }

    async fn handle_frame(&mut self, msg: RpcMessage) -> Flow {
        match self.state.state() {
            ConnectionState::Unregistered => {
                self.handle_register(msg).await;
                Flow::Continue
            }
            ConnectionState::Registered if msg.is_kill_signal() => {
                info!("[rpc-server] kill signal from {}", self.device_label());
                if let Err(e) = self.state.start_closing() {
                    warn!("[rpc-server] {}", e);
                }
                Flow::Close
            }
            ConnectionState::Registered => {
                if let Some(tx) = &self.response_tx {
                    if tx.send(msg).is_err() {
                        debug!("[rpc-server] response for {} has no consumer", self.device_label());
                    }
                }
                Flow::Continue
            }
            ConnectionState::Closing | ConnectionState::Closed => Flow::Close,
        }
    }

    async fn handle_register(&mut self, msg: RpcMessage) {
        let Some(device_id) = msg.register_device_id().map(str::to_owned) else {
            warn!(
                "[rpc-server] {} sent {:?} before registering",
                self.peer, msg.name
            );
            self.send(&RpcMessage::error()).await;
            return;
        };

        let (response_tx, response_rx) = mpsc::unbounded_channel();
        let session = Arc::new(DeviceSession::new(
            device_id,
            Some(self.peer),
            self.write_tx.clone(),
            response_rx,
            self.call_timeout,
        ));

        if let Err(e) = self.state.register() {
            warn!("[rpc-server] {}", e);
            self.send(&RpcMessage::error()).await;
            return;
        }

        self.registry.register(session.clone());
        self.session = Some(session);
        self.response_tx = Some(response_tx);
        self.send(&RpcMessage::ok()).await;
    }

    /// Tear down after a kill signal or end-of-stream.
    fn finish(&mut self) {
        if self.state.is_registered() {
            if let Err(e) = self.state.start_closing() {
                warn!("[rpc-server] {}", e);
            }
        }

        if let Some(session) = self.session.take() {
            self.registry.remove_session(&session);
            session.mark_closed();
        }
        // Dropping the sender wakes a caller blocked on the response queue.
        self.response_tx = None;

        if let Err(e) = self.state.close_complete() {
            warn!("[rpc-server] {}", e);
        }
        info!("[rpc-server] connection from {} closed", self.peer);
    }

    async fn send(&self, msg: &RpcMessage) {
        match encode_frame(msg) {
            Ok(frame) => {
                if self.write_tx.send(frame).await.is_err() {
                    warn!("[rpc-server] writer for {} is gone", self.peer);
                }
            }
            Err(e) => warn!("[rpc-server] failed to encode reply: {}", e),
        }
    }

    fn device_label(&self) -> String {
        match &self.session {
            Some(session) => format!("{} ({})", session.device_id(), self.peer),
            None => self.peer.to_string(),
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<SessionRegistry>,
    call_timeout: Duration,
) {
    let (mut reader, writer) = stream.into_split();
    let (write_tx, write_rx) = mpsc::channel::<String>(WRITE_QUEUE_DEPTH);
    let writer_task = tokio::spawn(write_loop(writer, write_rx, peer));

    let mut conn = Connection::new(peer, registry, write_tx, call_timeout);
    let mut codec = FrameCodec::new();
    let mut buf = vec![0u8; READ_CHUNK];

    'read: loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                debug!("[rpc-server] end of stream from {}", peer);
                break;
            }
            Ok(n) => n,
            Err(e) => {
                warn!("[rpc-server] read from {} failed: {}", peer, e);
                break;
            }
        };
        codec.feed(&buf[..n]);

        loop {
            match codec.decode_next() {
                Ok(Some(msg)) => {
                    if conn.handle_frame(msg).await == Flow::Close {
                        break 'read;
                    }
                }
                Ok(None) => break,
                Err(e) => warn!("[rpc-server] malformed frame from {}: {}", peer, e),
            }
        }
    }

    conn.finish();
    // Sessions may outlive the connection in callers' hands; stop the writer
    // explicitly so the socket closes now.
    writer_task.abort();
}

async fn write_loop(mut writer: OwnedWriteHalf, mut write_rx: mpsc::Receiver<String>, peer: SocketAddr) {
    while let Some(frame) = write_rx.recv().await {
        if let Err(e) = writer.write_all(frame.as_bytes()).await {
            warn!("[rpc-server] write to {} failed: {}", peer, e);
            break;
        }
    }
    let _ = writer.shutdown().await;
}
