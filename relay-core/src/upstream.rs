use async_trait::async_trait;
use serde_json::Value;

use crate::visitor::VisitorContext;

/// Query parameters sent to the offers API, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OfferQuery {
    pub params: Vec<(String, String)>,
}

impl OfferQuery {
    pub fn new(ip: &str, user_agent: &str) -> Self {
        Self {
            params: vec![
                ("ip".to_string(), ip.to_string()),
                ("user_agent".to_string(), user_agent.to_string()),
            ],
        }
    }

    /// Standard query for a classified visitor. `country` is omitted when it
    /// would not narrow anything.
    pub fn for_visitor(visitor: &VisitorContext) -> Self {
        let query = Self::new(&visitor.ip, &visitor.user_agent);
        if relay_offer::is_unrestricted(&visitor.country) {
            query
        } else {
            query.with("country", &visitor.country)
        }
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.params.push((key.to_string(), value.to_string()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

/// Raw HTTP outcome from the offers API
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: u16,
    pub body: String,
}

impl UpstreamReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Outbound port to the ad network's offers endpoint.
#[async_trait]
pub trait OfferSource: Send + Sync {
    /// Issue one GET with bearer auth. Any received response, whatever its
    /// status, is `Ok`; `Err` means no response was obtained.
    async fn fetch(
        &self,
        api_key: &str,
        query: &OfferQuery,
    ) -> Result<UpstreamReply, Box<dyn std::error::Error + Send + Sync>>;
}

/// Fields of interest from an IP geolocation / reputation lookup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoInfo {
    pub proxy: bool,
    pub vpn: bool,
    pub hosting: bool,
    pub country: Option<String>,
}

impl GeoInfo {
    /// Only literal `true` flags count; providers omit or null them freely.
    pub fn from_json(body: &Value) -> Self {
        Self {
            proxy: body["proxy"].as_bool() == Some(true),
            vpn: body["vpn"].as_bool() == Some(true),
            hosting: body["hosting"].as_bool() == Some(true),
            country: body["country"]
                .as_str()
                .map(|c| c.trim().to_ascii_uppercase())
                .filter(|c| !c.is_empty()),
        }
    }

    pub fn is_anonymized(&self) -> bool {
        self.proxy || self.vpn || self.hosting
    }
}

/// Outbound port to the geolocation service. Callers treat every error as
/// "no information".
#[async_trait]
pub trait GeoLookup: Send + Sync {
    async fn lookup(&self, ip: &str) -> Result<GeoInfo, Box<dyn std::error::Error + Send + Sync>>;
}
