//! Rate-limiting buckets and their keyed storage

mod leaky;
mod storage;
mod token;

pub use leaky::LeakyBucket;
pub use storage::{BucketStorage, MemoryBucketStorage};
pub use token::TokenBucket;

use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Rates are expressed per minute
pub(crate) const MINUTE: Duration = Duration::from_secs(60);

/// Rate limiter owned by a single key
///
/// Implementations compute time-based state lazily from the `now` they are
/// handed and guard their own state, so a shared bucket may be inspected
/// from any number of tasks.
pub trait Bucket: Send + Sync + fmt::Debug {
    /// Consume capacity for one request at `now`; `false` means deny
    fn conform(&self, now: Instant) -> bool;

    /// `false` once the bucket is fully recovered and idle past its timeout
    fn is_active(&self, now: Instant) -> bool;
}

/// Bucket handle as kept in storage
pub type SharedBucket = Arc<dyn Bucket>;

/// Rate-limiting algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketKind {
    #[default]
    Token,
    Leaky,
}

impl fmt::Display for BucketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketKind::Token => f.write_str("token"),
            BucketKind::Leaky => f.write_str("leaky"),
        }
    }
}

impl FromStr for BucketKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "token" => Ok(BucketKind::Token),
            "leaky" => Ok(BucketKind::Leaky),
            other => Err(CoreError::InvalidConfig(format!(
                "unknown bucket kind `{}` (expected token | leaky)",
                other
            ))),
        }
    }
}

/// Recipe for the buckets of one classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketSpec {
    pub kind: BucketKind,
    /// Requests per minute
    pub limit: u32,
    pub active_timeout: Duration,
}

impl BucketSpec {
    pub fn new(kind: BucketKind, limit: u32, active_timeout: Duration) -> Self {
        Self {
            kind,
            limit,
            active_timeout,
        }
    }

    /// Build a fresh (full) bucket as of `now`
    pub fn build(&self, now: Instant) -> Result<SharedBucket> {
        let bucket: SharedBucket = match self.kind {
            BucketKind::Token => {
                Arc::new(TokenBucket::per_minute(now, self.limit, self.active_timeout)?)
            }
            BucketKind::Leaky => {
                Arc::new(LeakyBucket::per_minute(now, self.limit, self.active_timeout)?)
            }
        };
        Ok(bucket)
    }
}
