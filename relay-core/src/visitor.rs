use relay_offer::TrackingParams;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

pub const FORWARDED_FOR: &str = "x-forwarded-for";
pub const REAL_IP: &str = "x-real-ip";
pub const USER_AGENT: &str = "user-agent";

/// Substrings that mark a User-Agent as automated traffic.
pub const DEFAULT_BOT_PATTERNS: &[&str] = &[
    "bot", "crawler", "spider", "facebookexternalhit", "facebot", "curl", "wget",
    "python", "postman", "monitor", "uptime", "check", "preview", "googlebot", "bingbot",
];

pub const DEFAULT_FALLBACK_IP: &str = "8.8.8.8";

// ============================================================================
// Inbound request
// ============================================================================

/// The parts of an inbound HTTP request the relay looks at.
///
/// Kept independent of the web framework so the pipeline can be driven from
/// tests without a server.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    headers: Vec<(String, String)>,
    query: HashMap<String, String>,
    remote_addr: Option<IpAddr>,
}

impl InboundRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_query_map(mut self, query: HashMap<String, String>) -> Self {
        self.query.extend(query);
        self
    }

    pub fn with_remote_addr(mut self, addr: Option<IpAddr>) -> Self {
        self.remote_addr = addr;
        self
    }

    /// Case-insensitive header lookup. First occurrence wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    pub fn remote_addr(&self) -> Option<IpAddr> {
        self.remote_addr
    }

    pub fn tracking(&self) -> TrackingParams {
        TrackingParams {
            aff_sub4: self.query("aff_sub4").unwrap_or_default().to_string(),
            aff_sub5: self.query("aff_sub5").unwrap_or_default().to_string(),
        }
    }

    /// `debug=true`, compared case-insensitively.
    pub fn wants_debug(&self) -> bool {
        self.query("debug")
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }
}

// ============================================================================
// Visitor context
// ============================================================================

/// Where the IP sent upstream came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpSource {
    /// The client's own public address.
    Client,
    /// Missing, unparseable or non-public client address; a configured fallback was used.
    Fallback,
}

/// Everything derived about the visitor, fixed once the filters have run.
#[derive(Debug, Clone)]
pub struct VisitorContext {
    pub ip: String,
    pub ip_source: IpSource,
    pub user_agent: String,
    /// Upper-cased ISO-2 code, empty when unknown.
    pub country: String,
    pub tracking: TrackingParams,
}

// ============================================================================
// IP resolution
// ============================================================================

/// Public addresses substituted for private or loopback clients
#[derive(Debug, Clone)]
pub struct FallbackIps {
    pub default: String,
    pub by_country: HashMap<String, String>,
}

impl FallbackIps {
    pub fn new(default: impl Into<String>) -> Self {
        Self { default: default.into(), by_country: HashMap::new() }
    }

    pub fn with_country(mut self, country: &str, ip: impl Into<String>) -> Self {
        self.by_country.insert(country.to_ascii_uppercase(), ip.into());
        self
    }

    pub fn for_country(&self, country: &str) -> &str {
        self.by_country
            .get(&country.to_ascii_uppercase())
            .map(String::as_str)
            .unwrap_or(&self.default)
    }
}

impl Default for FallbackIps {
    fn default() -> Self {
        Self::new(DEFAULT_FALLBACK_IP)
    }
}

/// The client address as reported by the proxy chain, before validation:
/// first `x-forwarded-for` hop, then `x-real-ip`, then the socket peer.
pub fn reported_client_ip(req: &InboundRequest) -> Option<String> {
    let first_token = |v: &str| {
        v.split(',')
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    req.header(FORWARDED_FOR)
        .and_then(first_token)
        .or_else(|| req.header(REAL_IP).and_then(first_token))
        .or_else(|| req.remote_addr().map(|a| a.to_string()))
}

/// Resolve the address forwarded to the offers API.
///
/// Non-public addresses are never forwarded: offer targeting fails on them.
pub fn resolve_ip(req: &InboundRequest, country: &str, fallback: &FallbackIps) -> (String, IpSource) {
    match reported_client_ip(req).as_deref().and_then(parse_ip) {
        Some(ip) if is_public(&ip) => (ip.to_string(), IpSource::Client),
        _ => (fallback.for_country(country).to_string(), IpSource::Fallback),
    }
}

/// Accepts a bare address or `addr:port` / `[v6]:port`.
fn parse_ip(raw: &str) -> Option<IpAddr> {
    raw.parse::<IpAddr>()
        .ok()
        .or_else(|| raw.parse::<SocketAddr>().ok().map(|s| s.ip()))
}

pub fn is_public(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified())
        }
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_public(&IpAddr::V4(mapped));
            }
            let first = v6.segments()[0];
            let unique_local = first & 0xfe00 == 0xfc00;
            let link_local = first & 0xffc0 == 0xfe80;
            !(v6.is_loopback() || v6.is_unspecified() || unique_local || link_local)
        }
    }
}

// ============================================================================
// Country
// ============================================================================

/// Country known without any lookup: `country` query override, then the
/// platform geography header. Upper-cased, empty when neither is present.
pub fn requested_country(req: &InboundRequest, geo_header: &str) -> String {
    req.query("country")
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .or_else(|| req.header(geo_header).map(str::trim))
        .unwrap_or_default()
        .to_ascii_uppercase()
}

// ============================================================================
// Bot filter
// ============================================================================

/// Coarse User-Agent deny-list. Not a security boundary.
#[derive(Debug, Clone)]
pub struct BotFilter {
    patterns: Vec<String>,
}

impl BotFilter {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self { patterns }
    }

    pub fn is_bot(&self, user_agent: &str) -> bool {
        let ua = user_agent.to_lowercase();
        self.patterns.iter().any(|p| ua.contains(p.as_str()))
    }
}

impl Default for BotFilter {
    fn default() -> Self {
        Self::new(DEFAULT_BOT_PATTERNS)
    }
}
