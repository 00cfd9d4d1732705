use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::{fs, sync::Mutex};

use super::{rank, ProxyFilter, Store, StoreError};
use crate::proxy::Proxy;

/// In-process store, optionally mirrored to a JSON snapshot.
///
/// Writes only mark the store dirty; the snapshot is rewritten on `persist`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, Proxy>>,
    snapshot: Option<PathBuf>,
    dirty: AtomicBool,
    flush_lock: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `path` if it exists and keeps it up to date afterwards.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let mut records = HashMap::new();
        if fs::try_exists(path).await? {
            let raw = fs::read(path).await?;
            let proxies: Vec<Proxy> =
                serde_json::from_slice(&raw).map_err(|source| StoreError::Snapshot {
                    path: path.to_path_buf(),
                    source,
                })?;
            for proxy in proxies {
                records.insert(proxy.ip.clone(), proxy);
            }
            log::info!("loaded {} proxies from {}", records.len(), path.display());
        } else if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        Ok(MemoryStore {
            records: RwLock::new(records),
            snapshot: Some(path.to_path_buf()),
            dirty: AtomicBool::new(false),
            flush_lock: Mutex::new(()),
        })
    }

    fn touch(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// Whether changes are waiting for the next `persist`.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    async fn flush(&self, path: &Path) -> Result<(), StoreError> {
        let _guard = self.flush_lock.lock().await;
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let data = {
            let records = self.records.read();
            let mut proxies: Vec<&Proxy> = records.values().collect();
            proxies.sort_by(|a, b| a.ip.cmp(&b.ip));
            serde_json::to_vec_pretty(&proxies)
        };
        let data = match data {
            Ok(data) => data,
            Err(e) => {
                self.touch();
                return Err(e.into());
            }
        };

        let tmp = path.with_extension("json.tmp");
        let written = async {
            fs::write(&tmp, data).await?;
            fs::rename(&tmp, path).await
        }
        .await;
        if let Err(e) = written {
            // keep the changes pending for the next attempt
            self.touch();
            return Err(e.into());
        }
        log::debug!("snapshot written to {}", path.display());
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_if_absent(&self, proxy: &Proxy) -> Result<bool, StoreError> {
        {
            let mut records = self.records.write();
            if records.contains_key(&proxy.ip) {
                log::warn!("Proxy already exists: {}", proxy);
                return Ok(false);
            }
            records.insert(proxy.ip.clone(), proxy.clone());
        }
        log::info!("Insert proxy: {}", proxy);
        self.touch();
        Ok(true)
    }

    async fn update(&self, proxy: &Proxy) -> Result<(), StoreError> {
        {
            let mut records = self.records.write();
            let mut updated = proxy.clone();
            // domains disabled while the proxy was being checked must survive
            if let Some(current) = records.get(&proxy.ip) {
                for domain in &current.disable_domains {
                    updated.disable_domain(domain);
                }
            }
            records.insert(updated.ip.clone(), updated);
        }
        log::debug!("Update proxy: {}", proxy);
        self.touch();
        Ok(())
    }

    async fn delete(&self, ip: &str) -> Result<bool, StoreError> {
        let removed = self.records.write().remove(ip);
        match removed {
            Some(proxy) => {
                log::info!("Delete proxy: {}", proxy);
                self.touch();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_all(&self) -> Result<Vec<Proxy>, StoreError> {
        Ok(self.records.read().values().cloned().collect())
    }

    async fn query(&self, filter: &ProxyFilter, limit: usize) -> Result<Vec<Proxy>, StoreError> {
        let mut proxies: Vec<Proxy> = self
            .records
            .read()
            .values()
            .filter(|proxy| filter.matches(proxy))
            .cloned()
            .collect();
        proxies.sort_by(rank);
        if limit != 0 {
            proxies.truncate(limit);
        }
        Ok(proxies)
    }

    async fn add_disabled_domain(&self, ip: &str, domain: &str) -> Result<bool, StoreError> {
        let changed = match self.records.write().get_mut(ip) {
            Some(proxy) => proxy.disable_domain(domain),
            None => false,
        };
        if changed {
            log::info!("Domain {} disabled for {}", domain, ip);
            self.touch();
        }
        Ok(changed)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.records.read().len())
    }

    async fn persist(&self) -> Result<(), StoreError> {
        match &self.snapshot {
            Some(path) if self.is_dirty() => self.flush(path).await,
            _ => Ok(()),
        }
    }
}
