//! Device wire protocol
//!
//! Newline-delimited, escaped JSON frames carrying [`RpcMessage`]s between
//! the host and the on-device agent.

mod codec;
mod message;

pub use codec::{
    decode_frame, encode_frame, escape, unescape, CodecError, FrameCodec, FRAME_DELIMITER,
    MAX_FRAME_SIZE,
};
pub use message::{MessageType, ProtocolVersion, RpcMessage, FAIL, REGISTER};
