use async_trait::async_trait;
use relay_core::{GeoInfo, GeoLookup};
use serde_json::Value;
use std::time::Duration;

pub const IP_PLACEHOLDER: &str = "{ip}";

/// IP geolocation / reputation lookup (ipapi.co style: `GET /{ip}/json/`)
#[derive(Clone)]
pub struct HttpGeoLookup {
    client: reqwest::Client,
    url_template: String,
}

impl HttpGeoLookup {
    pub fn new(url_template: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("offer-relay/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, url_template: url_template.into() })
    }

    fn url_for(&self, ip: &str) -> String {
        // Addresses only carry [0-9a-fA-F.:], nothing to escape.
        self.url_template.replace(IP_PLACEHOLDER, ip)
    }
}

#[async_trait]
impl GeoLookup for HttpGeoLookup {
    async fn lookup(&self, ip: &str) -> Result<GeoInfo, Box<dyn std::error::Error + Send + Sync>> {
        let body: Value = self
            .client
            .get(self.url_for(ip))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(GeoInfo::from_json(&body))
    }
}
