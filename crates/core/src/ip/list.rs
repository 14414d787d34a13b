//! IP list capability and its in-memory implementation

use super::IpEntry;
use crate::{CoreError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Set of host/subnet entries
///
/// `has` is exact-value membership; `is_conform` is the broader test that
/// also matches hosts covered by a subnet entry.
#[async_trait]
pub trait IpList: Send + Sync {
    /// Add an entry; no-op if the exact value is present
    async fn add(&self, ip: &IpEntry) -> Result<()>;

    /// Remove an exact-value entry; no-op if absent
    async fn delete(&self, ip: &IpEntry) -> Result<()>;

    async fn has(&self, ip: &IpEntry) -> Result<bool>;

    /// Is the host `ip` equal to, or covered by, any entry?
    ///
    /// # Errors
    /// - `MaskNotAllowed` if `ip` carries a mask
    async fn is_conform(&self, ip: &IpEntry) -> Result<bool>;

    async fn count(&self) -> Result<usize>;

    async fn clear(&self) -> Result<()>;
}

/// In-memory IP list
///
/// Unordered; lookups are linear in the number of entries.
#[derive(Clone, Default)]
pub struct MemoryIpList {
    entries: Arc<RwLock<Vec<IpEntry>>>,
}

impl MemoryIpList {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IpList for MemoryIpList {
    async fn add(&self, ip: &IpEntry) -> Result<()> {
        let mut entries = self.entries.write().await;
        if !entries.contains(ip) {
            entries.push(ip.clone());
        }
        Ok(())
    }

    async fn delete(&self, ip: &IpEntry) -> Result<()> {
        let mut entries = self.entries.write().await;
        if let Some(index) = entries.iter().position(|e| e == ip) {
            entries.swap_remove(index);
        }
        Ok(())
    }

    async fn has(&self, ip: &IpEntry) -> Result<bool> {
        Ok(self.entries.read().await.contains(ip))
    }

    async fn is_conform(&self, ip: &IpEntry) -> Result<bool> {
        if ip.has_mask() {
            return Err(CoreError::MaskNotAllowed(ip.as_str().to_string()));
        }

        let entries = self.entries.read().await;
        Ok(entries.iter().any(|entry| entry.matches(ip)))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }
}
