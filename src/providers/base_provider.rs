use std::time::Duration;

use anyhow::Context;
use futures_util::{stream::BoxStream, StreamExt};
use rand::Rng;
use regex::Regex;
use reqwest::Client;

use super::SourceAdapter;
use crate::{error_context, proxy::Candidate, utils::http::get_headers};

/// `ip:port` anywhere in a plain text list.
pub const PLAIN_LIST_PATTERN: &str =
    r#"(?P<ip>(?:\d{1,3}\.){3}\d{1,3})\s*:\s*(?P<port>\d{1,5})"#;

/// Regex driven scraper shared by every registered source.
///
/// The pattern must define the named groups `ip` and `port`; an `area` group
/// is picked up when present.
#[derive(Debug, Clone)]
pub struct Provider {
    pub name: &'static str,
    pub urls: Vec<String>,
    pub pattern: Regex,
    /// Random pause range in seconds before each page request.
    pub pace: Option<(f64, f64)>,
    client: Client,
}

impl Provider {
    pub fn new(
        name: &'static str,
        urls: Vec<String>,
        pattern: &str,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(get_headers(true))
            .build()
            .context(error_context!())?;
        Ok(Provider {
            name,
            urls,
            pattern: Regex::new(pattern).context(error_context!())?,
            pace: None,
            client,
        })
    }

    pub fn with_pace(mut self, min_secs: f64, max_secs: f64) -> Self {
        self.pace = Some((min_secs, max_secs));
        self
    }

    pub async fn get_html(&self, url: &str) -> anyhow::Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context(error_context!())?
            .error_for_status()
            .context(error_context!())?;
        response.text().await.context(error_context!())
    }

    pub fn find_proxies(&self, html: &str) -> Vec<Candidate> {
        let mut proxies = vec![];
        for cap in self.pattern.captures_iter(html) {
            let (Some(ip), Some(port)) = (cap.name("ip"), cap.name("port")) else {
                continue;
            };
            if port.as_str().trim().parse::<u16>().is_err() {
                continue;
            }
            let area = cap.name("area").map(|m| m.as_str());
            proxies.push(Candidate::new(ip.as_str(), port.as_str(), area));
        }
        proxies
    }

    async fn fetch_page(&self, url: &str) -> anyhow::Result<Vec<Candidate>> {
        if let Some((min, max)) = self.pace {
            let secs = rand::thread_rng().gen_range(min..=max);
            tokio::time::sleep(Duration::from_secs_f64(secs)).await;
        }
        let html = self
            .get_html(url)
            .await
            .with_context(|| format!("failed to fetch {}", url))?;
        let proxies = self.find_proxies(&html);
        log::debug!("{} proxies found on {}", proxies.len(), url);
        Ok(proxies)
    }
}

impl SourceAdapter for Provider {
    fn name(&self) -> &str {
        self.name
    }

    fn candidates(&self) -> BoxStream<'_, anyhow::Result<Vec<Candidate>>> {
        futures_util::stream::iter(self.urls.iter())
            .then(move |url| self.fetch_page(url))
            .boxed()
    }
}
