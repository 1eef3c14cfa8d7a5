use relay_core::OfferRedirectHandler;
use relay_store::{Config, HttpGeoLookup, HttpOfferSource};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<OfferRedirectHandler>,
}

impl AppState {
    pub fn new(relay: OfferRedirectHandler) -> Self {
        Self { relay: Arc::new(relay) }
    }

    /// Wire the HTTP adapters described by `config` into a handler.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let offers = HttpOfferSource::new(
            config.upstream.base_url.clone(),
            Duration::from_secs(config.upstream.timeout_secs),
        )?;
        let mut relay = OfferRedirectHandler::new(config.relay_settings(), Arc::new(offers));

        if config.geo.enabled {
            let geo = HttpGeoLookup::new(
                config.geo.url_template.clone(),
                Duration::from_secs(config.geo.timeout_secs),
            )?;
            relay = relay.with_geo(Arc::new(geo));
        }

        Ok(Self::new(relay))
    }
}
