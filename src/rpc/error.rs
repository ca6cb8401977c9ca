//! RPC error types

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::protocol::CodecError;
use crate::remote::ArgError;

/// Errors surfaced to callers of a device session.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Device {0} is not connected")]
    NotConnected(String),

    #[error("Connection to device {0} closed while waiting for a response")]
    ConnectionClosed(String),

    #[error("RPC call timeout after {0:?}")]
    Timeout(Duration),

    #[error("Remote call {call} failed: {}", join_args(.args))]
    RemoteFailure { call: String, args: Vec<Value> },

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Argument error: {0}")]
    Argument(#[from] ArgError),
}

impl RpcError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Render the remote side's diagnostic arguments.
fn join_args(args: &[Value]) -> String {
    args.iter()
        .map(|arg| match arg {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors from running the transport server itself.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_remote_failure_message_carries_args() {
        let err = RpcError::RemoteFailure {
            call: "call".to_string(),
            args: vec![json!("NoSuchMethodException"), json!(3)],
        };
        assert_eq!(
            err.to_string(),
            "Remote call call failed: NoSuchMethodException, 3"
        );
    }

    #[test]
    fn test_timeout_kind() {
        assert!(RpcError::Timeout(Duration::from_secs(1)).is_timeout());
        assert!(!RpcError::NotConnected("d".into()).is_timeout());
    }
}
