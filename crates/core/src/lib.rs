//! Antibrute Core - brute-force protection decisions
//!
//! This crate provides:
//! - Rate-limit buckets (token and leaky) and their keyed storage
//! - IP black/white lists with subnet matching
//! - The authentication decision engine and its idle sweeper
//! - Wire types and the length-prefixed Postcard codec
//! - QUIC transport configuration shared by server and client

// Version constants
pub const PROTOCOL_VERSION: u32 = 1;
pub const APP_VERSION_STRING: &str = env!("CARGO_PKG_VERSION");

pub mod bucket;
pub mod clock;
pub mod engine;
pub mod error;
pub mod ip;
pub mod protocol;
pub mod sweeper;
pub mod transport;
pub mod types;

// Re-export common types
pub use bucket::{Bucket, BucketKind, BucketSpec, BucketStorage, LeakyBucket, MemoryBucketStorage, TokenBucket};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{AuthEngine, BucketStorages, IpLists, Limits, ListCounts, SweepReport};
pub use error::{CoreError, Result};
pub use ip::{IpEntry, IpList, MemoryIpList};
pub use protocol::MessageCodec;
pub use sweeper::Sweeper;
pub use types::{AuthRequest, BucketCounts, ClearBucketRequest, ErrorKind, NetworkMessage, Request, Response};
