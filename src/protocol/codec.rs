//! Line framing for the device wire protocol
//!
//! Frame format:
//! ```text
//! <escaped-json>\n
//! ```
//!
//! The JSON text is escaped so that it never contains a raw newline:
//! - `%`  -> `%e`
//! - `\n` -> `%n`
//!
//! Decoding reverses `%n` first, then `%e`. Reversing `%e` first would turn
//! an escaped literal `%n` (`%en`) into a newline.

use bytes::{Buf, BytesMut};
use thiserror::Error;

use super::message::RpcMessage;

/// Frame terminator
pub const FRAME_DELIMITER: u8 = b'\n';

/// Maximum size of a single frame (16 MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Invalid JSON frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Frame too large: {0} bytes without delimiter")]
    FrameTooLarge(usize),
}

/// Escape a payload so it fits on one line.
pub fn escape(raw: &str) -> String {
    raw.replace('%', "%e").replace('\n', "%n")
}

/// Reverse [`escape`].
pub fn unescape(escaped: &str) -> String {
    escaped.replace("%n", "\n").replace("%e", "%")
}

/// Encode a message into a complete frame, delimiter included.
pub fn encode_frame(msg: &RpcMessage) -> Result<String, CodecError> {
    let json = serde_json::to_string(msg)?;
    let mut frame = escape(&json);
    frame.push(FRAME_DELIMITER as char);
    Ok(frame)
}

/// Decode one frame. Trailing delimiter and carriage return are ignored.
pub fn decode_frame(line: &str) -> Result<RpcMessage, CodecError> {
    let line = line.trim_end_matches(['\n', '\r']);
    Ok(serde_json::from_str(&unescape(line))?)
}

/// Incremental frame splitter for a byte stream
pub struct FrameCodec {
    buffer: BytesMut,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
        }
    }

    /// Feed raw bytes from the socket
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Take the next complete line, skipping blank ones.
    ///
    /// Returns `Ok(None)` when no full line is buffered yet. An oversized
    /// partial line is dropped and reported as an error.
    pub fn next_line(&mut self) -> Result<Option<String>, CodecError> {
        loop {
            let Some(pos) = self.buffer.iter().position(|b| *b == FRAME_DELIMITER) else {
                if self.is_overflow() {
                    let len = self.buffer.len();
                    self.buffer.clear();
                    return Err(CodecError::FrameTooLarge(len));
                }
                return Ok(None);
            };

            let line = self.buffer.split_to(pos);
            self.buffer.advance(1);

            let text = String::from_utf8_lossy(&line);
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            return Ok(Some(text.to_string()));
        }
    }

    /// Decode the next complete frame.
    ///
    /// A malformed line is consumed before its error is returned, so the
    /// caller can log it and keep reading.
    pub fn decode_next(&mut self) -> Result<Option<RpcMessage>, CodecError> {
        match self.next_line()? {
            Some(line) => decode_frame(&line).map(Some),
            None => Ok(None),
        }
    }

    /// Clear internal buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Check if buffer is too large (possible malformed data)
    pub fn is_overflow(&self) -> bool {
        self.buffer.len() > MAX_FRAME_SIZE
    }

    /// Get buffer length
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}
