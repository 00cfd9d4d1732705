use std::{collections::HashMap, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::time::{timeout, Instant};
use url::Url;

use crate::{
    error_context,
    proxy::{NickType, Protocol, Proxy},
    utils::http::get_headers,
};

pub const DEFAULT_HTTP_JUDGE: &str = "http://httpbin.org/get";
pub const DEFAULT_HTTPS_JUDGE: &str = "https://httpbin.org/get";

/// Header a non-elite proxy leaves behind in the echoed request.
const PROXY_MARK_HEADER: &str = "proxy-connection";

/// Anything that can tell whether a proxy works right now.
#[async_trait]
pub trait Validate: Send + Sync {
    async fn validate(&self, proxy: Proxy) -> Proxy;
}

/// Result of a single probe through the proxy.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Success { nick_type: NickType, speed: f64 },
    Timeout,
    ConnectionError(String),
    MalformedResponse(String),
}

impl std::fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeOutcome::Success { nick_type, speed } => {
                write!(f, "success ({}, {:.2}s)", nick_type, speed)
            }
            ProbeOutcome::Timeout => f.write_str("timeout"),
            ProbeOutcome::ConnectionError(e) => write!(f, "connection error: {}", e),
            ProbeOutcome::MalformedResponse(e) => write!(f, "malformed response: {}", e),
        }
    }
}

/// Body returned by an httpbin-style `/get` endpoint.
#[derive(Debug, Deserialize)]
pub struct EchoPayload {
    pub origin: String,
    pub headers: HashMap<String, serde_json::Value>,
}

impl EchoPayload {
    pub fn parse(body: &str) -> Result<Self, String> {
        serde_json::from_str(body).map_err(|e| e.to_string())
    }

    /// More than one origin address means the proxy forwarded ours.
    pub fn anonymity(&self) -> NickType {
        if self.origin.contains(',') {
            NickType::Transparent
        } else if self
            .headers
            .iter()
            .any(|(name, value)| name.eq_ignore_ascii_case(PROXY_MARK_HEADER) && is_set(value))
        {
            NickType::Anonymous
        } else {
            NickType::Elite
        }
    }
}

/// An echoed header counts only when it carries a value.
fn is_set(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().map_or(true, |n| n != 0.0),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(a) => !a.is_empty(),
        serde_json::Value::Object(o) => !o.is_empty(),
    }
}

/// Folds both probe outcomes into the record fields.
pub fn apply_outcomes(proxy: &mut Proxy, http: &ProbeOutcome, https: &ProbeOutcome) {
    let (protocol, winner) = match (http, https) {
        (ProbeOutcome::Success { .. }, ProbeOutcome::Success { .. }) => (Protocol::Both, http),
        (ProbeOutcome::Success { .. }, _) => (Protocol::Http, http),
        (_, ProbeOutcome::Success { .. }) => (Protocol::Https, https),
        _ => {
            proxy.mark_unreachable();
            return;
        }
    };

    if let ProbeOutcome::Success { nick_type, speed } = winner {
        proxy.protocol = protocol;
        proxy.nick_type = *nick_type;
        proxy.speed = *speed;
    }
}

#[derive(Debug, Clone)]
pub struct Judge {
    pub http: Url,
    pub https: Url,
}

impl Judge {
    pub fn new(http: &str, https: &str) -> anyhow::Result<Self> {
        Ok(Judge {
            http: Url::parse(http).context(error_context!())?,
            https: Url::parse(https).context(error_context!())?,
        })
    }
}

impl std::fmt::Display for Judge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Judge {} | {}>", self.http, self.https)
    }
}

#[derive(Debug, Clone)]
pub struct Checker {
    pub judge: Judge,
    pub timeout: Duration,
    /// Reject https probes whose certificate does not verify.
    pub verify_ssl: bool,
}

impl Checker {
    pub fn new(judge: Judge, timeout: Duration) -> Self {
        Checker {
            judge,
            timeout,
            verify_ssl: true,
        }
    }

    pub fn with_verify_ssl(mut self, verify_ssl: bool) -> Self {
        self.verify_ssl = verify_ssl;
        self
    }

    fn build_client(&self, proxy: &Proxy) -> anyhow::Result<Client> {
        let route = reqwest::Proxy::all(proxy.as_url("http")).context(error_context!())?;
        Client::builder()
            .proxy(route)
            .timeout(self.timeout)
            .danger_accept_invalid_certs(!self.verify_ssl)
            .build()
            .context(error_context!())
    }

    pub async fn probe(&self, proxy: &Proxy, target: &Url) -> ProbeOutcome {
        let client = match self.build_client(proxy) {
            Ok(client) => client,
            Err(e) => return ProbeOutcome::ConnectionError(format!("{:#}", e)),
        };

        let start = Instant::now();
        let round_trip = async {
            let response = client
                .get(target.clone())
                .headers(get_headers(true))
                .send()
                .await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        let (status, body) = match timeout(self.timeout, round_trip).await {
            Err(_) => return ProbeOutcome::Timeout,
            Ok(Err(e)) if e.is_timeout() => return ProbeOutcome::Timeout,
            Ok(Err(e)) => return ProbeOutcome::ConnectionError(e.to_string()),
            Ok(Ok(done)) => done,
        };
        if !status.is_success() {
            return ProbeOutcome::MalformedResponse(format!("status {}", status));
        }

        let speed = (start.elapsed().as_secs_f64() * 100.0).round() / 100.0;
        match EchoPayload::parse(&body) {
            Ok(payload) => ProbeOutcome::Success {
                nick_type: payload.anonymity(),
                speed,
            },
            Err(e) => ProbeOutcome::MalformedResponse(e),
        }
    }
}

#[async_trait]
impl Validate for Checker {
    async fn validate(&self, mut proxy: Proxy) -> Proxy {
        let (http, https) = tokio::join!(
            self.probe(&proxy, &self.judge.http),
            self.probe(&proxy, &self.judge.https)
        );
        log::debug!(
            "{}:{} http probe: {}, https probe: {}",
            proxy.ip,
            proxy.port,
            http,
            https
        );
        apply_outcomes(&mut proxy, &http, &https);
        proxy
    }
}
