//! Wire types for the decision service

mod message;
mod request;
mod response;

pub use message::NetworkMessage;
pub use request::{AuthRequest, ClearBucketRequest, Request};
pub use response::{BucketCounts, ErrorKind, Response};
