//! Network protocol messages

use super::{Request, Response};
use crate::{CoreError, Result, APP_VERSION_STRING, PROTOCOL_VERSION};
use serde::{Deserialize, Serialize};

/// Network message type for the QUIC protocol
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum NetworkMessage {
    /// Protocol handshake, first message on every stream
    Hello {
        protocol_version: u32, // MUST match PROTOCOL_VERSION
        app_version: String,   // For logging only
    },

    /// Client → server operation
    Request { id: u64, request: Request },

    /// Server → client outcome, `id` echoes the request
    Response { id: u64, response: Response },

    /// Heartbeat/ping
    Ping { timestamp: u64 },

    /// Pong response
    Pong { timestamp: u64 },

    /// Stream close
    Close,
}

impl NetworkMessage {
    /// Create hello message
    pub fn hello() -> Self {
        Self::Hello {
            protocol_version: PROTOCOL_VERSION,
            app_version: APP_VERSION_STRING.to_string(),
        }
    }

    /// Validate handshake message
    pub fn validate_handshake(&self) -> Result<()> {
        match self {
            NetworkMessage::Hello { protocol_version, .. } => {
                if *protocol_version == PROTOCOL_VERSION {
                    Ok(())
                } else {
                    Err(CoreError::ProtocolVersionMismatch {
                        expected: PROTOCOL_VERSION,
                        got: *protocol_version,
                    })
                }
            }
            _ => Err(CoreError::InvalidHandshake),
        }
    }

    pub fn request(id: u64, request: Request) -> Self {
        Self::Request { id, request }
    }

    pub fn response(id: u64, response: Response) -> Self {
        Self::Response { id, response }
    }

    /// Create ping message
    pub fn ping() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self::Ping { timestamp }
    }

    /// Create pong response
    pub fn pong(timestamp: u64) -> Self {
        Self::Pong { timestamp }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AuthRequest, BucketCounts};

    #[test]
    fn test_hello_creation() {
        let msg = NetworkMessage::hello();
        assert!(matches!(msg, NetworkMessage::Hello { .. }));
        assert!(msg.validate_handshake().is_ok());
    }

    #[test]
    fn test_handshake_validation_invalid_version() {
        let msg = NetworkMessage::Hello {
            protocol_version: 999,
            app_version: "0.0.0".to_string(),
        };
        match msg.validate_handshake().unwrap_err() {
            CoreError::ProtocolVersionMismatch { expected, got } => {
                assert_eq!(expected, PROTOCOL_VERSION);
                assert_eq!(got, 999);
            }
            other => panic!("Expected ProtocolVersionMismatch error, got {:?}", other),
        }
    }

    #[test]
    fn test_handshake_validation_invalid_message_type() {
        let msg = NetworkMessage::request(1, Request::CountBuckets);
        assert!(matches!(msg.validate_handshake(), Err(CoreError::InvalidHandshake)));
    }

    #[test]
    fn test_request_message_serialization() {
        let msg = NetworkMessage::request(
            7,
            Request::Auth(AuthRequest::new("alice", "secret", "2001:db8::1")),
        );
        let serialized = postcard::to_allocvec(&msg).unwrap();
        let deserialized: NetworkMessage = postcard::from_bytes(&serialized).unwrap();
        assert_eq!(msg, deserialized);
    }

    #[test]
    fn test_response_message_serialization() {
        let msg = NetworkMessage::response(
            7,
            Response::BucketCounts(BucketCounts { login: 1, password: 2, ip: 3 }),
        );
        let serialized = postcard::to_allocvec(&msg).unwrap();
        let deserialized: NetworkMessage = postcard::from_bytes(&serialized).unwrap();
        assert_eq!(msg, deserialized);
    }

    #[test]
    fn test_ping_pong() {
        let ping = NetworkMessage::ping();
        let NetworkMessage::Ping { timestamp } = ping else {
            panic!("Expected Ping");
        };
        assert!(timestamp > 0);
        assert_eq!(NetworkMessage::pong(timestamp), NetworkMessage::Pong { timestamp });
    }
}
