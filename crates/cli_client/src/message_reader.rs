//! Message reader for length-prefixed QUIC messages
//!
//! Protocol format: [4-byte big-endian length][N-byte payload]

use anyhow::{Context, Result};
use antibrute_core::{MessageCodec, NetworkMessage};
use quinn::RecvStream;

/// Reads whole frames from a QUIC receive stream
pub struct MessageReader {
    recv: RecvStream,
}

impl MessageReader {
    pub fn new(recv: RecvStream) -> Self {
        Self { recv }
    }

    /// Read next complete message, waiting until all of it has arrived
    pub async fn read_message(&mut self) -> Result<NetworkMessage> {
        let mut len_buf = [0u8; 4];
        self.recv
            .read_exact(&mut len_buf)
            .await
            .context("Stream closed while reading length")?;

        // Oversized frames are rejected before allocating
        let len = MessageCodec::frame_len(len_buf)?;

        let mut data = vec![0u8; len];
        self.recv
            .read_exact(&mut data)
            .await
            .context("Stream closed while reading payload")?;

        MessageCodec::decode_payload(&data).context("Decode failed")
    }
}
