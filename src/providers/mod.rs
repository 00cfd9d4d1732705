pub mod base_provider;

use std::{collections::BTreeMap, time::Duration};

use futures_util::stream::BoxStream;

use self::base_provider::{Provider, PLAIN_LIST_PATTERN};
use crate::proxy::Candidate;

/// A source of candidate proxies.
///
/// `candidates` yields one batch per fetched page. A fresh adapter is built
/// for every ingestion cycle, so the stream does not need to be resumable.
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &str;
    fn candidates(&self) -> BoxStream<'_, anyhow::Result<Vec<Candidate>>>;
}

pub type Constructor = fn(Duration) -> anyhow::Result<Box<dyn SourceAdapter>>;

/// ip, port, then three cells with the area last.
pub const TABLE_IP_PORT_AREA: &str = r#"<td[^>]*>\s*(?P<ip>(?:\d{1,3}\.){3}\d{1,3})\s*</td>\s*<td[^>]*>\s*(?P<port>\d{1,5})\s*</td>\s*(?:<td[^>]*>[^<]*</td>\s*){2}<td[^>]*>\s*(?P<area>[^<]*?)\s*</td>"#;

/// Leading index cell, ip, port, one skipped cell, then the area.
pub const TABLE_INDEXED_IP_PORT_AREA: &str = r#"<td[^>]*>[^<]*</td>\s*<td[^>]*>\s*(?P<ip>(?:\d{1,3}\.){3}\d{1,3})\s*</td>\s*<td[^>]*>\s*(?P<port>\d{1,5})\s*</td>\s*<td[^>]*>[^<]*</td>\s*<td[^>]*>\s*(?P<area>[^<]*?)\s*</td>"#;

fn pages(template: &str, range: std::ops::Range<u32>) -> Vec<String> {
    range
        .map(|page| template.replace("{}", &page.to_string()))
        .collect()
}

fn ip3366(timeout: Duration) -> anyhow::Result<Box<dyn SourceAdapter>> {
    let urls = pages("http://www.ip3366.net/free/?stype=1&page={}", 1..10);
    Ok(Box::new(Provider::new(
        "ip3366.net",
        urls,
        TABLE_IP_PORT_AREA,
        timeout,
    )?))
}

fn kuaidaili(timeout: Duration) -> anyhow::Result<Box<dyn SourceAdapter>> {
    let urls = pages("https://www.kuaidaili.com/free/inha/{}/", 1..10);
    let provider = Provider::new("kuaidaili.com", urls, TABLE_IP_PORT_AREA, timeout)?;
    // the site bans clients that page through too quickly
    Ok(Box::new(provider.with_pace(1.0, 3.0)))
}

fn proxylistplus(timeout: Duration) -> anyhow::Result<Box<dyn SourceAdapter>> {
    let urls = pages("https://list.proxylistplus.com/Fresh-HTTP-Proxy-List-{}", 1..2);
    Ok(Box::new(Provider::new(
        "proxylistplus.com",
        urls,
        TABLE_INDEXED_IP_PORT_AREA,
        timeout,
    )?))
}

fn proxyscrape(timeout: Duration) -> anyhow::Result<Box<dyn SourceAdapter>> {
    Ok(Box::new(Provider::new(
        "api.proxyscrape.com",
        vec!["https://api.proxyscrape.com/?request=getproxies&proxytype=http".to_string()],
        PLAIN_LIST_PATTERN,
        timeout,
    )?))
}

fn monosans(timeout: Duration) -> anyhow::Result<Box<dyn SourceAdapter>> {
    Ok(Box::new(Provider::new(
        "github.com/monosans/proxy-list",
        vec![
            "https://raw.githubusercontent.com/monosans/proxy-list/main/proxies/http.txt"
                .to_string(),
        ],
        PLAIN_LIST_PATTERN,
        timeout,
    )?))
}

fn thespeedx(timeout: Duration) -> anyhow::Result<Box<dyn SourceAdapter>> {
    Ok(Box::new(Provider::new(
        "github.com/TheSpeedX/PROXY-List",
        vec!["https://raw.githubusercontent.com/TheSpeedX/SOCKS-List/master/http.txt".to_string()],
        PLAIN_LIST_PATTERN,
        timeout,
    )?))
}

/// Every known source, by the identifier used in the configuration.
pub fn registry() -> BTreeMap<&'static str, Constructor> {
    let mut registry: BTreeMap<&'static str, Constructor> = BTreeMap::new();
    registry.insert("ip3366", ip3366);
    registry.insert("kuaidaili", kuaidaili);
    registry.insert("proxylistplus", proxylistplus);
    registry.insert("proxyscrape", proxyscrape);
    registry.insert("monosans", monosans);
    registry.insert("thespeedx", thespeedx);
    registry
}

pub fn known_ids() -> Vec<String> {
    registry().keys().map(|id| id.to_string()).collect()
}

/// Builds one adapter per configured id. Unknown ids and adapters that fail
/// to build are logged and left out.
pub fn build_adapters(ids: &[String], timeout: Duration) -> Vec<Box<dyn SourceAdapter>> {
    let registry = registry();
    let mut adapters = vec![];
    for id in ids {
        let Some(constructor) = registry.get(id.as_str()) else {
            log::warn!("unknown proxy source '{}', skipped", id);
            continue;
        };
        match constructor(timeout) {
            Ok(adapter) => adapters.push(adapter),
            Err(e) => log::error!("unable to set up proxy source '{}': {:?}", id, e),
        }
    }
    adapters
}
