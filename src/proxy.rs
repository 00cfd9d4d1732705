use serde::{Deserialize, Serialize};

/// Speed recorded when no probe went through.
pub const UNREACHABLE_SPEED: f64 = -1.0;

/// Protocols the endpoint proxied during its last successful validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum Protocol {
    Http,
    Https,
    Both,
    Unknown,
}

impl From<Protocol> for i8 {
    fn from(value: Protocol) -> Self {
        match value {
            Protocol::Http => 0,
            Protocol::Https => 1,
            Protocol::Both => 2,
            Protocol::Unknown => -1,
        }
    }
}

impl TryFrom<i8> for Protocol {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Protocol::Http),
            1 => Ok(Protocol::Https),
            2 => Ok(Protocol::Both),
            -1 => Ok(Protocol::Unknown),
            other => Err(format!("invalid protocol code {}", other)),
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Protocol::Http => "HTTP",
            Protocol::Https => "HTTPS",
            Protocol::Both => "HTTP/HTTPS",
            Protocol::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Anonymity level as seen by the echo endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum NickType {
    Elite,
    Anonymous,
    Transparent,
    Unknown,
}

impl From<NickType> for i8 {
    fn from(value: NickType) -> Self {
        match value {
            NickType::Elite => 0,
            NickType::Anonymous => 1,
            NickType::Transparent => 2,
            NickType::Unknown => -1,
        }
    }
}

impl TryFrom<i8> for NickType {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(NickType::Elite),
            1 => Ok(NickType::Anonymous),
            2 => Ok(NickType::Transparent),
            -1 => Ok(NickType::Unknown),
            other => Err(format!("invalid anonymity code {}", other)),
        }
    }
}

impl std::fmt::Display for NickType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NickType::Elite => "Elite",
            NickType::Anonymous => "Anonymous",
            NickType::Transparent => "Transparent",
            NickType::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Unvalidated endpoint scraped by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub ip: String,
    pub port: String,
    pub area: Option<String>,
}

impl Candidate {
    pub fn new(ip: &str, port: &str, area: Option<&str>) -> Self {
        Candidate {
            ip: ip.trim().to_string(),
            port: port.trim().to_string(),
            area: area
                .map(str::trim)
                .filter(|area| !area.is_empty())
                .map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proxy {
    pub ip: String,
    pub port: String,
    pub protocol: Protocol,
    pub nick_type: NickType,
    pub speed: f64,
    #[serde(default)]
    pub area: Option<String>,
    pub score: u32,
    #[serde(default)]
    pub disable_domains: Vec<String>,
}

impl Proxy {
    pub fn new(ip: &str, port: &str, score: u32) -> Self {
        Proxy {
            ip: ip.to_string(),
            port: port.to_string(),
            protocol: Protocol::Unknown,
            nick_type: NickType::Unknown,
            speed: UNREACHABLE_SPEED,
            area: None,
            score,
            disable_domains: vec![],
        }
    }

    pub fn from_candidate(candidate: Candidate, score: u32) -> Self {
        let mut proxy = Proxy::new(&candidate.ip, &candidate.port, score);
        proxy.area = candidate.area;
        proxy
    }

    /// Whether the last validation found a working protocol.
    pub fn is_working(&self) -> bool {
        self.speed >= 0.0
    }

    pub fn mark_unreachable(&mut self) {
        self.protocol = Protocol::Unknown;
        self.nick_type = NickType::Unknown;
        self.speed = UNREACHABLE_SPEED;
    }

    /// Adds `domain` to the disable list, returns false when it was already there.
    pub fn disable_domain(&mut self, domain: &str) -> bool {
        if self.is_disabled_for(domain) {
            return false;
        }
        self.disable_domains.push(domain.to_string());
        true
    }

    pub fn is_disabled_for(&self, domain: &str) -> bool {
        self.disable_domains.iter().any(|d| d == domain)
    }

    pub fn as_text(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    pub fn as_url(&self, scheme: &str) -> String {
        format!("{}://{}:{}", scheme, self.ip, self.port)
    }
}

impl std::fmt::Display for Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<Proxy [{}: {}] {:.2}s score={} {}:{}>",
            self.protocol,
            self.nick_type,
            self.speed,
            self.score,
            self.ip,
            self.port
        )
    }
}
