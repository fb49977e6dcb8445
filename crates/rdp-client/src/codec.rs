//! Length-prefixed JSON framing: `<decimal byte length>:<json>`.

use serde::Serialize;
use serde_json::Value;

use crate::config::ConnectionConfig;
use crate::error::{RdpError, Result};

pub fn encode_frame<T: Serialize + ?Sized>(message: &T) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(message)
        .map_err(|err| RdpError::Protocol(format!("cannot encode packet: {err}")))?;
    let mut frame = format!("{}:", body.len()).into_bytes();
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Incremental decoder for inbound frames.
///
/// Limits are checked on the prefix, before the body is buffered in full.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    max_message_bytes: usize,
    max_length_prefix_digits: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(&ConnectionConfig::default())
    }
}

impl FrameDecoder {
    pub fn new(config: &ConnectionConfig) -> Self {
        Self {
            buf: Vec::new(),
            max_message_bytes: config.max_message_bytes,
            max_length_prefix_digits: config.max_length_prefix_digits.max(1),
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes received but not yet returned as a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Pop the next complete frame, or `None` if more bytes are needed.
    ///
    /// Errors leave the decoder unusable: the stream is no longer aligned on a
    /// frame boundary.
    pub fn next_frame(&mut self) -> Result<Option<Value>> {
        let Some(body_start) = self.parse_prefix()? else {
            return Ok(None);
        };
        let (separator, len) = body_start;
        let end = separator + 1 + len;
        if self.buf.len() < end {
            return Ok(None);
        }

        let frame: Vec<u8> = self.buf.drain(..end).skip(separator + 1).collect();
        serde_json::from_slice(&frame)
            .map(Some)
            .map_err(|err| RdpError::Protocol(format!("malformed JSON packet: {err}")))
    }

    /// Returns the separator index and the announced body length.
    fn parse_prefix(&self) -> Result<Option<(usize, usize)>> {
        let mut len: usize = 0;
        for (idx, &byte) in self.buf.iter().enumerate() {
            if byte == b':' {
                if idx == 0 {
                    return Err(RdpError::Protocol("empty length prefix".into()));
                }
                if len > self.max_message_bytes {
                    return Err(RdpError::FrameTooLarge {
                        len,
                        max: self.max_message_bytes,
                    });
                }
                return Ok(Some((idx, len)));
            }
            if !byte.is_ascii_digit() {
                if self.buf.starts_with(b"bulk") {
                    return Err(RdpError::Protocol("bulk packets are not supported".into()));
                }
                return Err(RdpError::Protocol(format!(
                    "invalid byte {byte:#04x} in length prefix"
                )));
            }
            if idx >= self.max_length_prefix_digits {
                return Err(RdpError::Protocol("length prefix too long".into()));
            }
            len = len
                .checked_mul(10)
                .and_then(|len| len.checked_add(usize::from(byte - b'0')))
                .ok_or(RdpError::FrameTooLarge {
                    len: usize::MAX,
                    max: self.max_message_bytes,
                })?;
        }
        Ok(None)
    }
}

/// Decode a buffer holding only complete frames.
pub fn decode_frames(bytes: &[u8]) -> Result<Vec<Value>> {
    let mut decoder = FrameDecoder::default();
    decoder.push(bytes);
    let mut frames = Vec::new();
    while let Some(frame) = decoder.next_frame()? {
        frames.push(frame);
    }
    if decoder.buffered() > 0 {
        return Err(RdpError::Protocol(format!(
            "{} trailing bytes after the last frame",
            decoder.buffered()
        )));
    }
    Ok(frames)
}
