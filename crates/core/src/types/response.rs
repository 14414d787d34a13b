//! Responses returned by the decision service

use crate::CoreError;
use serde::{Deserialize, Serialize};

/// Wire-level error classification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed request; retrying the same request cannot succeed
    Validation,
    /// A list or bucket backend failed; the verdict is indeterminate
    Storage,
    Internal,
}

/// Number of live buckets per classification
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BucketCounts {
    pub login: u64,
    pub password: u64,
    pub ip: u64,
}

/// Outcome carried by a `NetworkMessage::Response`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Response {
    /// Administrative operation applied
    Done,
    Auth { ok: bool },
    BucketCounts(BucketCounts),
    Error { kind: ErrorKind, message: String },
}

impl Response {
    pub fn error(err: &CoreError) -> Self {
        Response::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Turn an `Error` response back into a `CoreError`
    pub fn into_result(self) -> Result<Response, CoreError> {
        match self {
            Response::Error { kind, message } => Err(CoreError::Remote { kind, message }),
            other => Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_from_core_error() {
        let resp = Response::error(&CoreError::MaskNotAllowed("1.2.3.0/24".into()));
        match resp {
            Response::Error { kind, message } => {
                assert_eq!(kind, ErrorKind::Validation);
                assert!(message.contains("must not include a mask"));
            }
            _ => panic!("Expected Error response"),
        }
    }

    #[test]
    fn test_into_result() {
        assert_eq!(Response::Done.into_result().unwrap(), Response::Done);

        let err = Response::Error {
            kind: ErrorKind::Storage,
            message: "down".into(),
        }
        .into_result()
        .unwrap_err();
        assert!(matches!(err, CoreError::Remote { kind: ErrorKind::Storage, .. }));
    }
}
