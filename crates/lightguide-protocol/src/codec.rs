//! Frame codec for the `<`...`>` delimited protocol.
//!
//! Outbound frames are built with [`encode_frame`]. Inbound bytes (ACKs and
//! anything else the panel prints) are accumulated by [`FrameCodec`], which
//! reports whether an ACK has been seen.

use bytes::{Buf, BytesMut};

use crate::constants::{ACK_TOKEN, FIELD_SEPARATOR, FRAME_END, FRAME_START};
use crate::error::{ProtocolError, ProtocolResult};

/// Maximum number of inbound bytes kept while waiting for a frame.
pub const MAX_BUFFERED: usize = 512;

/// Join fields into one frame: `<f1,f2,...>`.
pub fn encode_frame(fields: &[&str]) -> String {
    let separator = FIELD_SEPARATOR.to_string();
    let body = fields.join(separator.as_str());
    let mut frame = String::with_capacity(body.len() + 2);
    frame.push(FRAME_START as char);
    frame.push_str(&body);
    frame.push(FRAME_END as char);
    frame
}

/// Split one frame into its fields. Fields are not trimmed.
pub fn split_frame(frame: &str) -> ProtocolResult<Vec<&str>> {
    let body = frame
        .strip_prefix(FRAME_START as char)
        .and_then(|rest| rest.strip_suffix(FRAME_END as char))
        .ok_or_else(|| ProtocolError::InvalidFrame(format!("{:?} is not <...> delimited", frame)))?;
    if body.contains(FRAME_START as char) || body.contains(FRAME_END as char) {
        return Err(ProtocolError::InvalidFrame(format!(
            "{:?} contains a nested delimiter",
            frame
        )));
    }
    Ok(body.split(FIELD_SEPARATOR).collect())
}

/// Accumulates inbound bytes from the panel.
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Buffer for accumulating incoming data.
    buffer: BytesMut,
}

impl FrameCodec {
    /// Create a new frame codec.
    pub fn new() -> Self {
        FrameCodec {
            buffer: BytesMut::with_capacity(MAX_BUFFERED),
        }
    }

    /// Add received data to the buffer.
    ///
    /// When the buffer would grow past [`MAX_BUFFERED`], the oldest bytes are
    /// discarded.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
        if self.buffer.len() > MAX_BUFFERED {
            let excess = self.buffer.len() - MAX_BUFFERED;
            self.buffer.advance(excess);
        }
    }

    /// True if the buffered data contains the ACK token anywhere.
    pub fn contains_ack(&self) -> bool {
        self.buffer
            .windows(ACK_TOKEN.len())
            .any(|window| window == ACK_TOKEN)
    }

    /// True if the last buffered byte is the frame delimiter `>`.
    pub fn ends_with_delimiter(&self) -> bool {
        self.buffer.last() == Some(&FRAME_END)
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Get the current buffer contents as a string (for debugging).
    pub fn buffer_as_str(&self) -> String {
        String::from_utf8_lossy(&self.buffer).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_frame() {
        assert_eq!(encode_frame(&["A", "1", "X", "empty"]), "<A,1,X,empty>");
    }

    #[test]
    fn test_split_frame() {
        assert_eq!(split_frame("<A,1,X, >").unwrap(), vec!["A", "1", "X", " "]);
        assert!(split_frame("A,1,X").is_err());
        assert!(split_frame("<A,<1>").is_err());
    }

    #[test]
    fn test_ack_in_chunks() {
        let mut codec = FrameCodec::new();
        codec.push(b"<AC");
        assert!(!codec.contains_ack());
        assert!(!codec.ends_with_delimiter());

        codec.push(b"K>");
        assert!(codec.contains_ack());
        assert!(codec.ends_with_delimiter());
    }

    #[test]
    fn test_ack_after_noise() {
        let mut codec = FrameCodec::new();
        codec.push(b"boot ok\r\n<READY><ACK>");
        assert!(codec.contains_ack());
    }

    #[test]
    fn test_buffer_is_bounded() {
        let mut codec = FrameCodec::new();
        codec.push(&[b'x'; MAX_BUFFERED * 2]);
        assert_eq!(codec.buffered_len(), MAX_BUFFERED);
        codec.push(b"<ACK>");
        assert!(codec.contains_ack());
    }
}
