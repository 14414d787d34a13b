//! Postcard serialization codec for network messages
//!
//! Frame format: `[4 bytes length (big endian)] [postcard payload]`

use crate::error::{CoreError, Result};
use crate::types::NetworkMessage;
use postcard::{from_bytes, to_allocvec};

/// Maximum payload size (16MB)
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

const LEN_PREFIX: usize = 4;

/// Message codec for serialization/deserialization
pub struct MessageCodec;

impl MessageCodec {
    /// Encode network message to a length-prefixed frame
    pub fn encode(msg: &NetworkMessage) -> Result<Vec<u8>> {
        let payload = to_allocvec(msg).map_err(CoreError::from)?;

        // Limit message size
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(CoreError::MessageTooLarge {
                size: payload.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        let len = payload.len() as u32;
        let mut buf = Vec::with_capacity(LEN_PREFIX + payload.len());
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(&payload);

        Ok(buf)
    }

    /// Decode one complete frame
    pub fn decode(buf: &[u8]) -> Result<NetworkMessage> {
        match Self::try_decode(buf)? {
            Some((msg, _)) => Ok(msg),
            None => Err(CoreError::InvalidMessageFormat(
                "Buffer too small for frame".into(),
            )),
        }
    }

    /// Decode a bare payload (length prefix already consumed)
    pub fn decode_payload(payload: &[u8]) -> Result<NetworkMessage> {
        from_bytes(payload).map_err(CoreError::from)
    }

    /// Read the length prefix, rejecting oversized frames
    pub fn frame_len(prefix: [u8; LEN_PREFIX]) -> Result<usize> {
        let len = u32::from_be_bytes(prefix) as usize;
        if len > MAX_MESSAGE_SIZE {
            return Err(CoreError::MessageTooLarge {
                size: len,
                max: MAX_MESSAGE_SIZE,
            });
        }
        Ok(len)
    }

    /// Try to decode the first frame of a receive buffer
    ///
    /// Returns `Ok(None)` while the frame is incomplete, otherwise the
    /// message and the number of bytes it occupied.
    pub fn try_decode(buf: &[u8]) -> Result<Option<(NetworkMessage, usize)>> {
        if buf.len() < LEN_PREFIX {
            return Ok(None);
        }

        let len = Self::frame_len([buf[0], buf[1], buf[2], buf[3]])?;
        let end = LEN_PREFIX + len;
        if buf.len() < end {
            return Ok(None);
        }

        let msg = Self::decode_payload(&buf[LEN_PREFIX..end])?;
        Ok(Some((msg, end)))
    }

    /// Decode every complete frame in `buf`; a trailing partial frame is ignored
    pub fn decode_stream(buf: &[u8]) -> Result<Vec<NetworkMessage>> {
        let mut messages = Vec::new();
        let mut offset = 0;

        while let Some((msg, used)) = Self::try_decode(&buf[offset..])? {
            messages.push(msg);
            offset += used;
        }

        Ok(messages)
    }
}
