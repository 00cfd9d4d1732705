use rand::seq::SliceRandom;
use thiserror::Error;

use crate::{
    proxy::{NickType, Protocol, Proxy},
    store::{ProxyFilter, SharedStore, StoreError},
};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("No proxies available")]
    EmptyResult,

    #[error("Please provide {0} parameter")]
    MissingParameter(&'static str),

    #[error("Invalid {name} parameter: {value}")]
    InvalidParameter { name: &'static str, value: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Translates consumer-facing filters into store queries.
pub fn build_filter(protocol: Option<&str>, domain: Option<&str>, nick_type: NickType) -> ProxyFilter {
    let protocols = match protocol {
        None => vec![Protocol::Both],
        Some(p) if p.eq_ignore_ascii_case("http") => vec![Protocol::Http, Protocol::Both],
        Some(_) => vec![Protocol::Https, Protocol::Both],
    };

    ProxyFilter {
        nick_type: Some(nick_type),
        protocols: Some(protocols),
        exclude_domain: domain
            .filter(|domain| !domain.is_empty())
            .map(str::to_string),
    }
}

#[derive(Clone)]
pub struct PoolQuery {
    store: SharedStore,
}

impl PoolQuery {
    pub fn new(store: SharedStore) -> Self {
        PoolQuery { store }
    }

    pub async fn get_proxies(
        &self,
        protocol: Option<&str>,
        domain: Option<&str>,
        limit: usize,
        nick_type: NickType,
    ) -> Result<Vec<Proxy>, PoolError> {
        let filter = build_filter(protocol, domain, nick_type);
        Ok(self.store.query(&filter, limit).await?)
    }

    pub async fn random_proxy(
        &self,
        protocol: Option<&str>,
        domain: Option<&str>,
        limit: usize,
        nick_type: NickType,
    ) -> Result<Proxy, PoolError> {
        let proxies = self.get_proxies(protocol, domain, limit, nick_type).await?;
        proxies
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or(PoolError::EmptyResult)
    }

    pub async fn disable_domain(
        &self,
        ip: Option<&str>,
        domain: Option<&str>,
    ) -> Result<bool, PoolError> {
        let ip = ip
            .filter(|ip| !ip.is_empty())
            .ok_or(PoolError::MissingParameter("IP"))?;
        let domain = domain
            .filter(|domain| !domain.is_empty())
            .ok_or(PoolError::MissingParameter("domain"))?;

        let changed = self.store.add_disabled_domain(ip, domain).await?;
        if changed {
            self.store.persist().await?;
        } else {
            log::debug!("{} already disabled for {} or ip unknown", domain, ip);
        }
        Ok(changed)
    }
}
