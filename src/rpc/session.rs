//! Device Session - request/response over a device connection
//!
//! One session per registered device. Calls look synchronous to the caller
//! while the exchange on the wire is asynchronous:
//!
//! ```text
//! caller ──call()──▸ writer task ──frame──▸ device
//!   ▲                                          │
//!   └──── response queue ◂── reader task ◂─────┘
//! ```
//!
//! # Single in-flight call
//!
//! Responses are matched in FIFO order, not by message id, so at most one
//! call may be outstanding per session. `call` holds the response queue lock
//! for the whole exchange: concurrent callers on the same session wait their
//! turn instead of receiving each other's answers.
//!
//! A timeout cancels the wait locally only. A late answer to a timed-out call
//! is dropped before the next call is sent, or skipped if it carries an older
//! `msg_id`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use super::error::RpcError;
use crate::protocol::{encode_frame, ProtocolVersion, RpcMessage};

/// Default timeout for RPC calls.
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 120;

/// Per-call settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallOptions {
    pub timeout: Duration,
    pub version: ProtocolVersion,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
            version: ProtocolVersion::Plain,
        }
    }
}

impl CallOptions {
    /// Reflection call with the default timeout.
    pub fn reflection() -> Self {
        Self {
            version: ProtocolVersion::Reflection,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_version(mut self, version: ProtocolVersion) -> Self {
        self.version = version;
        self
    }
}

/// Communication channel to one connected device.
pub struct DeviceSession {
    device_id: String,
    peer_addr: Option<SocketAddr>,
    connected_at: DateTime<Utc>,

    /// Encoded frames for the connection's writer task.
    write_tx: mpsc::Sender<String>,

    /// Unmatched result frames pushed by the connection's reader.
    responses: Mutex<mpsc::UnboundedReceiver<RpcMessage>>,

    /// Last assigned message id; the first call uses 1.
    last_msg_id: AtomicU64,

    closed: AtomicBool,

    default_timeout: Duration,
}

impl DeviceSession {
    pub fn new(
        device_id: impl Into<String>,
        peer_addr: Option<SocketAddr>,
        write_tx: mpsc::Sender<String>,
        responses: mpsc::UnboundedReceiver<RpcMessage>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            peer_addr,
            connected_at: Utc::now(),
            write_tx,
            responses: Mutex::new(responses),
            last_msg_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            default_timeout,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Id of the most recent call, 0 before the first one.
    pub fn last_msg_id(&self) -> u64 {
        self.last_msg_id.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn mark_closed(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("[device-session] {} marked closed", self.device_id);
        }
    }

    /// Plain call using the session's default timeout.
    pub async fn call(&self, name: &str, args: Vec<Value>) -> Result<RpcMessage, RpcError> {
        let options = CallOptions::default().with_timeout(self.default_timeout);
        self.call_with(name, args, options).await
    }

    /// Send a call and wait for its response.
    ///
    /// A response named `Fail` is returned as [`RpcError::RemoteFailure`].
    pub async fn call_with(
        &self,
        name: &str,
        args: Vec<Value>,
        options: CallOptions,
    ) -> Result<RpcMessage, RpcError> {
        if self.is_closed() {
            return Err(RpcError::NotConnected(self.device_id.clone()));
        }

        // Held until the response is consumed: one call in flight per session.
        let mut responses = self.responses.lock().await;

        while let Ok(stale) = responses.try_recv() {
            warn!(
                "[device-session] {} dropping stale response {:?} (msg_id {:?})",
                self.device_id, stale.name, stale.msg_id
            );
        }

        let msg_id = self.last_msg_id.fetch_add(1, Ordering::AcqRel) + 1;
        let request = RpcMessage::call(msg_id, name, args, options.version);
        let frame = encode_frame(&request)?;

        debug!(
            "[device-session] {} -> #{} {} ({} args)",
            self.device_id,
            msg_id,
            name,
            request.args.len()
        );

        self.write_tx
            .send(frame)
            .await
            .map_err(|_| RpcError::ConnectionClosed(self.device_id.clone()))?;

        let deadline = tokio::time::Instant::now() + options.timeout;
        let response = loop {
            match tokio::time::timeout_at(deadline, responses.recv()).await {
                Err(_) => {
                    warn!(
                        "[device-session] {} call #{} {} timed out after {:?}",
                        self.device_id, msg_id, name, options.timeout
                    );
                    return Err(RpcError::Timeout(options.timeout));
                }
                Ok(None) => return Err(RpcError::ConnectionClosed(self.device_id.clone())),
                Ok(Some(msg)) => match msg.msg_id {
                    Some(id) if id < msg_id => {
                        debug!(
                            "[device-session] {} skipping late response for #{}",
                            self.device_id, id
                        );
                    }
                    _ => break msg,
                },
            }
        };

        debug!(
            "[device-session] {} <- #{} {}",
            self.device_id, msg_id, response.name
        );

        if response.is_failure() {
            return Err(RpcError::RemoteFailure {
                call: name.to_string(),
                args: response.args,
            });
        }
        Ok(response)
    }

    /// Ask the device to tear the connection down. Does not wait for an
    /// acknowledgment; the server removes the session when the device hangs up.
    pub async fn close(&self) -> Result<(), RpcError> {
        let frame = encode_frame(&RpcMessage::kill_signal())?;
        self.write_tx
            .send(frame)
            .await
            .map_err(|_| RpcError::NotConnected(self.device_id.clone()))?;
        info!("[device-session] kill signal sent to {}", self.device_id);
        Ok(())
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("device_id", &self.device_id)
            .field("peer_addr", &self.peer_addr)
            .field("last_msg_id", &self.last_msg_id())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// In-memory device end for tests that do not need a socket.
#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::DeviceSession;
    use crate::protocol::{decode_frame, RpcMessage};

    /// The device side of a loopback session.
    pub(crate) struct FakeDevice {
        pub outgoing: mpsc::Receiver<String>,
        pub incoming: mpsc::UnboundedSender<RpcMessage>,
    }

    impl FakeDevice {
        /// Next call the host sent, decoded.
        pub(crate) async fn next_call(&mut self) -> RpcMessage {
            let frame = self.outgoing.recv().await.expect("host hung up");
            decode_frame(&frame).expect("host sent a malformed frame")
        }

        pub(crate) fn reply(&self, msg: RpcMessage) {
            self.incoming.send(msg).expect("session dropped");
        }
    }

    pub(crate) fn loopback(device_id: &str) -> (Arc<DeviceSession>, FakeDevice) {
        let (write_tx, outgoing) = mpsc::channel(16);
        let (incoming, responses) = mpsc::unbounded_channel();
        let session = DeviceSession::new(
            device_id,
            None,
            write_tx,
            responses,
            Duration::from_secs(5),
        );
        (Arc::new(session), FakeDevice { outgoing, incoming })
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{loopback, FakeDevice};
    use super::*;
    use crate::protocol::MessageType;
    use serde_json::json;

    #[tokio::test]
    async fn test_call_assigns_monotonic_ids() {
        let (session, mut device) = loopback("dev-1");

        let agent = tokio::spawn(async move {
            for _ in 0..3 {
                let call = device.next_call().await;
                device.reply(RpcMessage::result("echo", vec![json!(call.msg_id)]));
            }
            device
        });

        for expected in 1..=3u64 {
            let res = session.call("echo", vec![]).await.unwrap();
            assert_eq!(res.args, vec![json!(expected)]);
        }
        assert_eq!(session.last_msg_id(), 3);
        agent.await.unwrap();
    }

    #[tokio::test]
    async fn test_call_frame_shape() {
        let (session, mut device) = loopback("dev-1");
        let agent = tokio::spawn(async move {
            let call = device.next_call().await;
            device.reply(RpcMessage::result("ok", vec![]));
            call
        });

        session
            .call_with("call", vec![json!("041:a.B"), json!("01getText")], CallOptions::reflection())
            .await
            .unwrap();

        let call = agent.await.unwrap();
        assert_eq!(call.msg_type, MessageType::Call);
        assert_eq!(call.version, ProtocolVersion::Reflection);
        assert_eq!(call.name, "call");
        assert_eq!(call.args, vec![json!("041:a.B"), json!("01getText")]);
    }

    #[tokio::test]
    async fn test_fail_response_becomes_remote_failure() {
        let (session, mut device) = loopback("dev-1");
        let agent = tokio::spawn(async move {
            device.next_call().await;
            device.reply(RpcMessage::result("Fail", vec![json!("NullPointerException")]));
            device
        });

        let err = session.call("boom", vec![]).await.unwrap_err();
        match err {
            RpcError::RemoteFailure { call, args } => {
                assert_eq!(call, "boom");
                assert_eq!(args, vec![json!("NullPointerException")]);
            }
            other => panic!("Expected RemoteFailure, got {:?}", other),
        }
        agent.await.unwrap();
    }

    #[tokio::test]
    async fn test_timeout_then_session_still_usable() {
        let (session, mut device) = loopback("dev-1");

        let options = CallOptions::default().with_timeout(Duration::from_millis(200));
        let err = session.call_with("slow", vec![], options).await.unwrap_err();
        assert!(err.is_timeout());

        // The late answer to #1 arrives before the next call is answered.
        let first = device.next_call().await;
        assert_eq!(first.msg_id, Some(1));
        let mut late = RpcMessage::result("late", vec![]);
        late.msg_id = Some(1);
        device.reply(late);

        let agent = tokio::spawn(async move {
            let call = device.next_call().await;
            let mut reply = RpcMessage::result("fresh", vec![]);
            reply.msg_id = call.msg_id;
            device.reply(reply);
            device
        });

        let res = session.call_with("fast", vec![], options).await.unwrap();
        assert_eq!(res.name, "fresh");
        agent.await.unwrap();
    }

    #[tokio::test]
    async fn test_late_response_with_older_id_is_skipped() {
        let (session, mut device) = loopback("dev-1");
        let options = CallOptions::default().with_timeout(Duration::from_millis(100));
        assert!(session.call_with("slow", vec![], options).await.is_err());
        device.next_call().await;

        let agent = tokio::spawn(async move {
            let call = device.next_call().await;
            // Late answer for #1 lands while #2 is already waiting.
            let mut late = RpcMessage::result("late", vec![]);
            late.msg_id = Some(1);
            device.reply(late);
            let mut reply = RpcMessage::result("fresh", vec![]);
            reply.msg_id = call.msg_id;
            device.reply(reply);
            device
        });

        let res = session
            .call_with("fast", vec![], options.with_timeout(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(res.name, "fresh");
        agent.await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_calls_are_serialized() {
        let (session, mut device) = loopback("dev-1");

        let agent = tokio::spawn(async move {
            for _ in 0..2 {
                let call = device.next_call().await;
                // Answer with the call's own name so crossed answers would show.
                device.reply(RpcMessage::result(call.name.clone(), vec![]));
            }
            device
        });

        let a = {
            let session = session.clone();
            tokio::spawn(async move { session.call("alpha", vec![]).await })
        };
        let b = {
            let session = session.clone();
            tokio::spawn(async move { session.call("beta", vec![]).await })
        };

        assert_eq!(a.await.unwrap().unwrap().name, "alpha");
        assert_eq!(b.await.unwrap().unwrap().name, "beta");
        agent.await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_session_rejects_calls() {
        let (session, _device) = loopback("dev-1");
        session.mark_closed();
        assert!(matches!(
            session.call("x", vec![]).await,
            Err(RpcError::NotConnected(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_drop_unblocks_caller() {
        let (session, device) = loopback("dev-1");
        let FakeDevice { outgoing, incoming } = device;
        drop(incoming);
        let _keep_writer = outgoing;
        assert!(matches!(
            session.call("x", vec![]).await,
            Err(RpcError::ConnectionClosed(_))
        ));
    }

    #[tokio::test]
    async fn test_close_sends_kill_signal() {
        let (session, mut device) = loopback("dev-1");
        session.close().await.unwrap();
        let msg = device.next_call().await;
        assert!(msg.is_kill_signal());
    }
}
