//! Keyed proxy storage.
//!
//! Records are keyed by `ip` alone, so two endpoints sharing an address but
//! listening on different ports collide and the later one is dropped as a
//! duplicate.

use std::{cmp::Ordering, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;

use crate::proxy::{NickType, Protocol, Proxy};

pub mod memory;

pub use memory::MemoryStore;

pub type SharedStore = Arc<dyn Store>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("corrupted snapshot {path}: {source}")]
    Snapshot {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Conditions a stored proxy must meet to be returned by [`Store::query`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProxyFilter {
    pub nick_type: Option<NickType>,
    pub protocols: Option<Vec<Protocol>>,
    pub exclude_domain: Option<String>,
}

impl ProxyFilter {
    pub fn matches(&self, proxy: &Proxy) -> bool {
        if let Some(nick_type) = self.nick_type {
            if proxy.nick_type != nick_type {
                return false;
            }
        }
        if let Some(protocols) = &self.protocols {
            if !protocols.contains(&proxy.protocol) {
                return false;
            }
        }
        if let Some(domain) = &self.exclude_domain {
            if proxy.is_disabled_for(domain) {
                return false;
            }
        }
        true
    }
}

/// Best proxies first: higher score, then lower latency.
pub fn rank(a: &Proxy, b: &Proxy) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| a.speed.total_cmp(&b.speed))
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Persists `proxy` unless a record with its ip exists. Check and insert
    /// are not guaranteed to be atomic across implementations.
    async fn insert_if_absent(&self, proxy: &Proxy) -> Result<bool, StoreError>;

    /// Overwrites the record stored under `proxy.ip`, creating it if needed.
    async fn update(&self, proxy: &Proxy) -> Result<(), StoreError>;

    async fn delete(&self, ip: &str) -> Result<bool, StoreError>;

    async fn list_all(&self) -> Result<Vec<Proxy>, StoreError>;

    /// Matching proxies in [`rank`] order; `limit == 0` returns all of them.
    async fn query(&self, filter: &ProxyFilter, limit: usize) -> Result<Vec<Proxy>, StoreError>;

    /// Returns whether `domain` was newly added for `ip`.
    async fn add_disabled_domain(&self, ip: &str, domain: &str) -> Result<bool, StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;

    /// Makes every change so far durable. Stores that write through can keep
    /// the default.
    async fn persist(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
