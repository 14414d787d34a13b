//! Authentication decision engine
//!
//! Judges a (login, password, ip) attempt with a fixed chain:
//!
//! 1. ip must be a bare host address
//! 2. blacklist match → deny
//! 3. whitelist match → allow
//! 4. ip bucket → deny if exhausted
//! 5. password bucket → deny if exhausted
//! 6. login bucket → its verdict
//!
//! The chain short-circuits: a stage that never runs consumes no token.
//! Blacklist wins over whitelist, so an address on both lists is denied.
//! Any collaborator error aborts the chain and is returned; it is never
//! turned into a verdict.

use crate::bucket::{BucketKind, BucketSpec, BucketStorage, MemoryBucketStorage};
use crate::clock::{Clock, SystemClock};
use crate::ip::{IpEntry, IpList, MemoryIpList};
use crate::types::{AuthRequest, BucketCounts, ClearBucketRequest};
use crate::{CoreError, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default login attempts per minute
pub const DEFAULT_LOGIN_LIMIT: u32 = 10;
/// Default attempts per minute with one password
pub const DEFAULT_PASSWORD_LIMIT: u32 = 100;
/// Default attempts per minute from one IP
pub const DEFAULT_IP_LIMIT: u32 = 1000;
/// Default idle time before a recovered bucket is evicted
pub const DEFAULT_ACTIVE_TIMEOUT: Duration = Duration::from_secs(120);

/// Per-minute limits and bucket policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub login: u32,
    pub password: u32,
    pub ip: u32,
    pub active_timeout: Duration,
    pub bucket_kind: BucketKind,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            login: DEFAULT_LOGIN_LIMIT,
            password: DEFAULT_PASSWORD_LIMIT,
            ip: DEFAULT_IP_LIMIT,
            active_timeout: DEFAULT_ACTIVE_TIMEOUT,
            bucket_kind: BucketKind::default(),
        }
    }
}

impl Limits {
    /// Reject limits no bucket can be built from
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("login", self.login), ("password", self.password), ("ip", self.ip)] {
            if value == 0 {
                return Err(CoreError::InvalidConfig(format!(
                    "{} limit must be greater than zero",
                    name
                )));
            }
        }
        if self.active_timeout.is_zero() {
            return Err(CoreError::InvalidConfig(
                "bucket active timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    fn spec(&self, limit: u32) -> BucketSpec {
        BucketSpec::new(self.bucket_kind, limit, self.active_timeout)
    }
}

/// The three bucket storages, one per classification
#[derive(Clone)]
pub struct BucketStorages {
    pub login: Arc<dyn BucketStorage>,
    pub password: Arc<dyn BucketStorage>,
    pub ip: Arc<dyn BucketStorage>,
}

impl BucketStorages {
    pub fn in_memory() -> Self {
        Self {
            login: Arc::new(MemoryBucketStorage::new()),
            password: Arc::new(MemoryBucketStorage::new()),
            ip: Arc::new(MemoryBucketStorage::new()),
        }
    }
}

/// Deny and allow lists
#[derive(Clone)]
pub struct IpLists {
    pub black: Arc<dyn IpList>,
    pub white: Arc<dyn IpList>,
}

impl IpLists {
    pub fn in_memory() -> Self {
        Self {
            black: Arc::new(MemoryIpList::new()),
            white: Arc::new(MemoryIpList::new()),
        }
    }
}

/// Entries per list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListCounts {
    pub black: usize,
    pub white: usize,
}

/// Buckets evicted by one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub login: usize,
    pub password: usize,
    pub ip: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.login + self.password + self.ip
    }
}

/// Stage of the chain that settled a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    BlackList,
    WhiteList,
    IpBucket,
    PasswordBucket,
    LoginBucket,
}

/// Brute-force protection engine
///
/// Owns its five collaborators and its clock; no global state.
pub struct AuthEngine {
    limits: Limits,
    buckets: BucketStorages,
    lists: IpLists,
    clock: Arc<dyn Clock>,
}

impl AuthEngine {
    /// Engine with in-memory collaborators and the system clock
    pub fn new(limits: Limits) -> Result<Self> {
        Self::with_clock(limits, Arc::new(SystemClock))
    }

    /// Engine with in-memory collaborators and a custom clock
    pub fn with_clock(limits: Limits, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::with_parts(limits, BucketStorages::in_memory(), IpLists::in_memory(), clock)
    }

    /// Engine over arbitrary storage backends
    ///
    /// # Errors
    /// - `InvalidConfig` if `limits` fail validation
    pub fn with_parts(
        limits: Limits,
        buckets: BucketStorages,
        lists: IpLists,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        limits.validate()?;
        Ok(Self {
            limits,
            buckets,
            lists,
            clock,
        })
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Decide whether an authentication attempt may proceed
    ///
    /// # Errors
    /// - `MissingField` / `InvalidIp` / `MaskNotAllowed` for a bad ip
    /// - any error raised by a list or bucket storage
    pub async fn auth(&self, request: &AuthRequest) -> Result<bool> {
        if request.ip.is_empty() {
            return Err(CoreError::MissingField("ip"));
        }
        let ip = IpEntry::parse_host(&request.ip)?;
        let now = self.clock.now();

        let (ok, stage) = self.decide(request, &ip, now).await?;
        tracing::debug!(
            login = %request.login,
            ip = %ip,
            ok,
            stage = ?stage,
            "Auth decided"
        );
        Ok(ok)
    }

    async fn decide(&self, request: &AuthRequest, ip: &IpEntry, now: Instant) -> Result<(bool, Stage)> {
        if self.lists.black.is_conform(ip).await? {
            return Ok((false, Stage::BlackList));
        }

        if self.lists.white.is_conform(ip).await? {
            return Ok((true, Stage::WhiteList));
        }

        if !self.conform(&*self.buckets.ip, ip.as_str(), self.limits.ip, now).await? {
            return Ok((false, Stage::IpBucket));
        }

        if !self
            .conform(&*self.buckets.password, &request.password, self.limits.password, now)
            .await?
        {
            return Ok((false, Stage::PasswordBucket));
        }

        let ok = self
            .conform(&*self.buckets.login, &request.login, self.limits.login, now)
            .await?;
        Ok((ok, Stage::LoginBucket))
    }

    /// Fetch-or-create the bucket for `key` and consume from it
    async fn conform(
        &self,
        storage: &dyn BucketStorage,
        key: &str,
        limit: u32,
        now: Instant,
    ) -> Result<bool> {
        let spec = self.limits.spec(limit);
        let bucket = storage.get_or_insert_with(key, &|| spec.build(now)).await?;
        Ok(bucket.conform(now))
    }

    /// Add a host or subnet to the blacklist
    pub async fn add_to_blacklist(&self, ip: &str) -> Result<()> {
        let ip = IpEntry::parse(ip)?;
        self.lists.black.add(&ip).await?;
        tracing::info!(ip = %ip, "Added to blacklist");
        Ok(())
    }

    /// Add a host or subnet to the whitelist
    pub async fn add_to_whitelist(&self, ip: &str) -> Result<()> {
        let ip = IpEntry::parse(ip)?;
        self.lists.white.add(&ip).await?;
        tracing::info!(ip = %ip, "Added to whitelist");
        Ok(())
    }

    /// Remove an exact entry from the blacklist
    pub async fn remove_from_blacklist(&self, ip: &str) -> Result<()> {
        let ip = IpEntry::parse(ip)?;
        self.lists.black.delete(&ip).await?;
        tracing::info!(ip = %ip, "Removed from blacklist");
        Ok(())
    }

    /// Remove an exact entry from the whitelist
    pub async fn remove_from_whitelist(&self, ip: &str) -> Result<()> {
        let ip = IpEntry::parse(ip)?;
        self.lists.white.delete(&ip).await?;
        tracing::info!(ip = %ip, "Removed from whitelist");
        Ok(())
    }

    pub async fn clear_blacklist(&self) -> Result<()> {
        self.lists.black.clear().await?;
        tracing::info!("Blacklist cleared");
        Ok(())
    }

    pub async fn clear_whitelist(&self) -> Result<()> {
        self.lists.white.clear().await?;
        tracing::info!("Whitelist cleared");
        Ok(())
    }

    /// Drop buckets for the given login, password and/or ip
    ///
    /// The ip is validated before anything is touched. A subnet ip drops
    /// every IP bucket whose address it covers.
    pub async fn clear_bucket(&self, request: &ClearBucketRequest) -> Result<()> {
        let ip = request.ip_key().map(IpEntry::parse).transpose()?;

        if let Some(login) = request.login_key() {
            self.buckets.login.delete(login).await?;
        }

        if let Some(password) = request.password_key() {
            self.buckets.password.delete(password).await?;
        }

        if let Some(ip) = ip {
            if ip.has_mask() {
                let covered = |key: &str| {
                    IpEntry::parse_host(key)
                        .map(|host| ip.contains(&host))
                        .unwrap_or(false)
                };
                let removed = self.buckets.ip.delete_matching(&covered).await?;
                tracing::info!(subnet = %ip, removed, "Cleared IP buckets in subnet");
            } else {
                self.buckets.ip.delete(ip.as_str()).await?;
            }
        }

        tracing::info!(
            login = request.login_key().is_some(),
            password = request.password_key().is_some(),
            ip = ?request.ip_key(),
            "Buckets cleared"
        );
        Ok(())
    }

    /// Live buckets per classification
    pub async fn count_buckets(&self) -> Result<BucketCounts> {
        Ok(BucketCounts {
            login: self.buckets.login.count().await? as u64,
            password: self.buckets.password.count().await? as u64,
            ip: self.buckets.ip.count().await? as u64,
        })
    }

    /// Entries per list
    pub async fn list_counts(&self) -> Result<ListCounts> {
        Ok(ListCounts {
            black: self.lists.black.count().await?,
            white: self.lists.white.count().await?,
        })
    }

    /// Evict idle buckets from all three storages
    pub async fn sweep_idle(&self) -> Result<SweepReport> {
        let now = self.clock.now();
        Ok(SweepReport {
            login: self.buckets.login.clear_not_active(now).await?,
            password: self.buckets.password.clear_not_active(now).await?,
            ip: self.buckets.ip.clear_not_active(now).await?,
        })
    }
}
