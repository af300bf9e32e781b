//! # Messages
//!
//! Free-text blocks printed on labels (ingredients, storage advice) and
//! referenced from PLUs by number.
//!
//! The 400-byte body is sent as eight 50-byte segments, each zero-padded.
//! Segments are contiguous slices of the encoded text, so the body is
//! the CP1251 text zero-filled to 400 bytes. Longer text is rejected.
//! Decoding drops every zero byte, not just the trailing ones.

use serde::{Deserialize, Serialize};

use super::cp1251;
use super::fields::{check_len, read_u16, u16_le};
use crate::error::{Result, ScaleError};

/// Body length on the wire.
pub const MESSAGE_BODY_LEN: usize = 400;

/// Segment width inside the body.
pub const MESSAGE_SEGMENT_LEN: usize = 50;

/// Number of segments in the body.
pub const MESSAGE_SEGMENTS: usize = MESSAGE_BODY_LEN / MESSAGE_SEGMENT_LEN;

/// Write payload length: id + body.
pub const MESSAGE_RECORD_LEN: usize = 2 + MESSAGE_BODY_LEN;

/// Highest message number.
pub const MAX_MESSAGE_ID: u16 = 1000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: u16,
    pub content: String,
}

impl Message {
    pub fn new(id: u16, content: impl Into<String>) -> Result<Self> {
        let msg = Self {
            id,
            content: content.into(),
        };
        msg.validate()?;
        Ok(msg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.id > MAX_MESSAGE_ID {
            return Err(ScaleError::InvalidValue(format!(
                "message number {} exceeds {}",
                self.id, MAX_MESSAGE_ID
            )));
        }
        let encoded = cp1251::encode(&self.content).len();
        if encoded > MESSAGE_BODY_LEN {
            return Err(ScaleError::InvalidValue(format!(
                "message {} is {} bytes, limit {}",
                self.id, encoded, MESSAGE_BODY_LEN
            )));
        }
        Ok(())
    }

    /// The 400-byte body.
    pub fn encode_body(&self) -> Vec<u8> {
        let text = cp1251::encode(&self.content);
        let mut body = Vec::with_capacity(MESSAGE_BODY_LEN);
        for segment in 0..MESSAGE_SEGMENTS {
            let start = (segment * MESSAGE_SEGMENT_LEN).min(text.len());
            let end = (start + MESSAGE_SEGMENT_LEN).min(text.len());
            let mut chunk = text[start..end].to_vec();
            chunk.resize(MESSAGE_SEGMENT_LEN, 0);
            body.extend(chunk);
        }
        body
    }

    /// Decode a 400-byte body (read response) for message `id`.
    pub fn decode_body(id: u16, bytes: &[u8]) -> Result<Self> {
        check_len("message body", bytes, MESSAGE_BODY_LEN)?;
        let text: Vec<u8> = bytes.iter().copied().filter(|&b| b != 0).collect();
        Ok(Self {
            id,
            content: cp1251::decode(&text),
        })
    }

    /// The 402-byte write payload.
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.validate()?;
        let mut out = Vec::with_capacity(MESSAGE_RECORD_LEN);
        out.extend(u16_le(self.id));
        out.extend(self.encode_body());
        Ok(out)
    }

    /// Decode a 402-byte write payload.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        check_len("message record", bytes, MESSAGE_RECORD_LEN)?;
        let id = read_u16("message number", &bytes[0..2])?;
        Self::decode_body(id, &bytes[2..])
    }
}
