use async_trait::async_trait;
use relay_core::{OfferQuery, OfferSource, UpstreamReply};
use reqwest::header::ACCEPT;
use std::time::Duration;
use tracing::debug;

/// Offers API client over HTTP
#[derive(Clone)]
pub struct HttpOfferSource {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpOfferSource {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint: endpoint.into() })
    }
}

#[async_trait]
impl OfferSource for HttpOfferSource {
    async fn fetch(
        &self,
        api_key: &str,
        query: &OfferQuery,
    ) -> Result<UpstreamReply, Box<dyn std::error::Error + Send + Sync>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&query.params)
            .bearer_auth(api_key)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(status, bytes = body.len(), "Offers API responded");

        Ok(UpstreamReply { status, body })
    }
}
