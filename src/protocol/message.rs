//! RPC message envelope
//!
//! One logical message per frame:
//!
//! ```json
//! {"msg_id": 3, "msg_type": 1, "version": 2, "name": "call", "args": ["041:a.B", "01getText"]}
//! ```
//!
//! `msg_type`: 1 = call, 2 = result, 99 = kill signal.
//! `version`: 1 = plain named RPC, 2 = reflection call.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Name of the registration handshake call.
pub const REGISTER: &str = "register";

/// Result name the agent uses to report a failed call.
pub const FAIL: &str = "Fail";

const OK: &str = "ok";
const ERROR: &str = "error";
const KILL: &str = "kill";

/// Message kinds on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum MessageType {
    #[default]
    Call,
    Result,
    KillSignal,
}

impl MessageType {
    pub fn as_code(&self) -> u8 {
        match self {
            Self::Call => 1,
            Self::Result => 2,
            Self::KillSignal => 99,
        }
    }
}

impl From<MessageType> for u8 {
    fn from(value: MessageType) -> Self {
        value.as_code()
    }
}

impl TryFrom<u8> for MessageType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Call),
            2 => Ok(Self::Result),
            99 => Ok(Self::KillSignal),
            other => Err(format!("unknown msg_type {}", other)),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call => write!(f, "call"),
            Self::Result => write!(f, "result"),
            Self::KillSignal => write!(f, "kill"),
        }
    }
}

/// Call semantics requested from the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ProtocolVersion {
    /// Plain named RPC
    #[default]
    Plain,
    /// Invoke a method on a remote instance or class by name
    Reflection,
}

impl From<ProtocolVersion> for u8 {
    fn from(value: ProtocolVersion) -> Self {
        match value {
            ProtocolVersion::Plain => 1,
            ProtocolVersion::Reflection => 2,
        }
    }
}

impl TryFrom<u8> for ProtocolVersion {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Plain),
            2 => Ok(Self::Reflection),
            other => Err(format!("unknown protocol version {}", other)),
        }
    }
}

/// A single RPC message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcMessage {
    /// Caller-assigned id, monotonic per session
    #[serde(default)]
    pub msg_id: Option<u64>,
    #[serde(default)]
    pub msg_type: MessageType,
    #[serde(default)]
    pub version: ProtocolVersion,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    /// Call-signature order, preserved exactly
    #[serde(default, deserialize_with = "null_as_empty")]
    pub args: Vec<Value>,
}

impl RpcMessage {
    pub fn call(
        msg_id: u64,
        name: impl Into<String>,
        args: Vec<Value>,
        version: ProtocolVersion,
    ) -> Self {
        Self {
            msg_id: Some(msg_id),
            msg_type: MessageType::Call,
            version,
            name: name.into(),
            args,
        }
    }

    pub fn result(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            msg_id: None,
            msg_type: MessageType::Result,
            version: ProtocolVersion::Plain,
            name: name.into(),
            args,
        }
    }

    /// Handshake call sent by a device.
    pub fn register(device_id: impl Into<String>) -> Self {
        Self {
            msg_id: None,
            msg_type: MessageType::Call,
            version: ProtocolVersion::Plain,
            name: REGISTER.to_string(),
            args: vec![Value::String(device_id.into())],
        }
    }

    /// Positive handshake reply.
    pub fn ok() -> Self {
        Self::result(OK, vec![Value::Bool(true)])
    }

    /// Negative reply to a bad handshake.
    pub fn error() -> Self {
        Self::result(ERROR, vec![Value::Bool(false)])
    }

    pub fn kill_signal() -> Self {
        Self {
            msg_id: None,
            msg_type: MessageType::KillSignal,
            version: ProtocolVersion::Plain,
            name: KILL.to_string(),
            args: Vec::new(),
        }
    }

    pub fn is_kill_signal(&self) -> bool {
        self.msg_type == MessageType::KillSignal
    }

    pub fn is_failure(&self) -> bool {
        self.name == FAIL
    }

    pub fn is_ok(&self) -> bool {
        self.msg_type == MessageType::Result && self.name == OK
    }

    /// Whether this is a well-formed registration call.
    pub fn register_device_id(&self) -> Option<&str> {
        if self.msg_type != MessageType::Call || self.name != REGISTER || self.args.len() != 1 {
            return None;
        }
        self.args[0].as_str().filter(|id| !id.is_empty())
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_codes_on_wire() {
        let msg = RpcMessage::call(3, "call", vec![json!("01x")], ProtocolVersion::Reflection);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["msg_type"], json!(1));
        assert_eq!(value["version"], json!(2));
        assert_eq!(value["msg_id"], json!(3));

        let kill = serde_json::to_value(RpcMessage::kill_signal()).unwrap();
        assert_eq!(kill["msg_type"], json!(99));
    }

    #[test]
    fn test_minimal_register_frame() {
        let msg: RpcMessage =
            serde_json::from_str(r#"{"name":"register","args":["emulator-5554"]}"#).unwrap();
        assert_eq!(msg.msg_type, MessageType::Call);
        assert_eq!(msg.register_device_id(), Some("emulator-5554"));
    }

    #[test]
    fn test_register_requires_exactly_one_string() {
        let none: RpcMessage = serde_json::from_str(r#"{"name":"register","args":[]}"#).unwrap();
        assert_eq!(none.register_device_id(), None);

        let two: RpcMessage =
            serde_json::from_str(r#"{"name":"register","args":["a","b"]}"#).unwrap();
        assert_eq!(two.register_device_id(), None);

        let number: RpcMessage =
            serde_json::from_str(r#"{"name":"register","args":[5]}"#).unwrap();
        assert_eq!(number.register_device_id(), None);
    }

    #[test]
    fn test_null_fields_tolerated() {
        let msg: RpcMessage =
            serde_json::from_str(r#"{"msg_id":null,"msg_type":2,"name":null,"args":null}"#)
                .unwrap();
        assert_eq!(msg.msg_type, MessageType::Result);
        assert!(msg.name.is_empty());
        assert!(msg.args.is_empty());
    }

    #[test]
    fn test_unknown_msg_type_rejected() {
        let result = serde_json::from_str::<RpcMessage>(r#"{"msg_type":7,"name":"x"}"#);
        assert!(result.is_err());
    }
}
