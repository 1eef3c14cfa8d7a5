use relay_offer::{
    build_tracking_link, filter_by_country, select_offer, Offer, OfferEnvelope, RandomSource,
    ThreadRandom,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{BlockReason, RelayError, RelayResult, UpstreamError};
use crate::settings::RelaySettings;
use crate::upstream::{GeoInfo, GeoLookup, OfferQuery, OfferSource, UpstreamReply};
use crate::visitor::{requested_country, resolve_ip, InboundRequest, IpSource, VisitorContext, USER_AGENT};

/// Query parameters the passthrough route forwards to the offers API.
pub const PASSTHROUGH_PARAMS: &[&str] = &["country", "type", "max", "ctype", "traffic"];

/// User-Agent sent upstream by the passthrough route when the client sent none.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0";

/// A successfully chosen offer and the link to send the visitor to
#[derive(Debug, Clone)]
pub struct Selection {
    pub visitor: VisitorContext,
    pub offer: Offer,
    /// Number of offers eligible for the visitor's country.
    pub offer_count: usize,
    pub link: String,
    pub debug: bool,
}

/// Upstream body relayed as-is by the passthrough route
#[derive(Debug, Clone)]
pub struct PassthroughReply {
    pub status: u16,
    pub body: Value,
}

/// Classifies a visitor, fetches offers and picks one.
///
/// Stateless across requests: everything it holds is read-only.
pub struct OfferRedirectHandler {
    settings: RelaySettings,
    offers: Arc<dyn OfferSource>,
    geo: Option<Arc<dyn GeoLookup>>,
    random: Arc<dyn RandomSource>,
}

impl OfferRedirectHandler {
    pub fn new(settings: RelaySettings, offers: Arc<dyn OfferSource>) -> Self {
        Self {
            settings,
            offers,
            geo: None,
            random: Arc::new(ThreadRandom),
        }
    }

    pub fn with_geo(mut self, geo: Arc<dyn GeoLookup>) -> Self {
        self.geo = Some(geo);
        self
    }

    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// Run the full redirect pipeline for one request.
    pub async fn handle(&self, req: &InboundRequest) -> RelayResult<Selection> {
        // 1. Fail closed before any outbound call
        let api_key = self.settings.credential()?;

        // 2. Country known up front, then the address to forward
        let mut country = requested_country(req, &self.settings.country_header);
        let (ip, ip_source) = resolve_ip(req, &country, &self.settings.fallback_ips);
        // Lower-cased once: bot matching, the upstream query and debug output share it
        let user_agent = req.header(USER_AGENT).unwrap_or_default().to_lowercase();

        // 3. Bot filter
        if self.settings.bot_filter.is_bot(&user_agent) {
            info!(ip = %ip, user_agent = %user_agent, "Blocked bot traffic");
            return Err(RelayError::Blocked(BlockReason::Bot));
        }

        // 4. Best-effort geolocation: VPN check and country enrichment share one call
        let wants_geo = self.settings.block_vpn || country.is_empty();
        if ip_source == IpSource::Client && wants_geo {
            if let Some(geo) = self.lookup_geo(&ip).await {
                if self.settings.block_vpn && geo.is_anonymized() {
                    info!(ip = %ip, "Blocked VPN/proxy traffic");
                    return Err(RelayError::Blocked(BlockReason::Vpn));
                }
                if country.is_empty() {
                    if let Some(c) = geo.country {
                        country = c;
                    }
                }
            }
        }

        let visitor = VisitorContext {
            ip,
            ip_source,
            user_agent,
            country,
            tracking: req.tracking(),
        };

        // 5. Fetch, filter, pick
        let offers = self.fetch_offers(api_key, &visitor).await?;
        let fetched = offers.len();
        let eligible = filter_by_country(offers, &visitor.country);
        debug!(country = %visitor.country, fetched, eligible = eligible.len(), "Filtered offers");

        let offer = select_offer(&eligible, &*self.random)
            .cloned()
            .ok_or_else(|| RelayError::no_offers(&visitor.country))?;

        // 6. Tracking link
        let link = offer
            .link
            .as_deref()
            .map(|l| build_tracking_link(l, &visitor.tracking))
            .ok_or_else(|| RelayError::Internal("selected offer has no link".to_string()))?;

        info!(
            ip = %visitor.ip,
            country = %visitor.country,
            offer_id = offer.id.as_deref().unwrap_or("-"),
            "Selected offer"
        );

        Ok(Selection {
            visitor,
            offer,
            offer_count: eligible.len(),
            link,
            debug: req.wants_debug(),
        })
    }

    /// Forward a raw offers query and hand back the upstream JSON untouched.
    pub async fn passthrough(&self, req: &InboundRequest) -> RelayResult<PassthroughReply> {
        let api_key = self.settings.credential()?;

        let country = requested_country(req, &self.settings.country_header);
        let (ip, _) = resolve_ip(req, &country, &self.settings.fallback_ips);
        let user_agent = req
            .header(USER_AGENT)
            .filter(|ua| !ua.is_empty())
            .unwrap_or(DEFAULT_USER_AGENT);

        let query = PASSTHROUGH_PARAMS.iter().fold(OfferQuery::new(&ip, user_agent), |q, key| {
            match req.query(key).filter(|v| !v.is_empty()) {
                Some(value) => q.with(key, value),
                None => q,
            }
        });

        let reply = self.call_upstream(api_key, &query).await?;
        let body = serde_json::from_str(&reply.body)
            .map_err(|e| UpstreamError::Unavailable(format!("invalid JSON from upstream: {e}")))?;

        Ok(PassthroughReply { status: reply.status, body })
    }

    async fn call_upstream(&self, api_key: &str, query: &OfferQuery) -> RelayResult<UpstreamReply> {
        self.offers.fetch(api_key, query).await.map_err(|e| {
            warn!("Offers API request failed: {}", e);
            RelayError::from(UpstreamError::Unavailable(e.to_string()))
        })
    }

    async fn fetch_offers(&self, api_key: &str, visitor: &VisitorContext) -> RelayResult<Vec<Offer>> {
        let query = OfferQuery::for_visitor(visitor);
        let reply = self.call_upstream(api_key, &query).await?;

        if !reply.is_success() {
            warn!(status = reply.status, "Offers API returned an error status");
            return Err(UpstreamError::Status {
                status: reply.status,
                body: reply.body,
            }
            .into());
        }

        let body: Value = serde_json::from_str(&reply.body)
            .map_err(|_| UpstreamError::Malformed(Value::String(reply.body.clone())))?;

        let envelope = OfferEnvelope::parse(&body).map_err(|e| {
            warn!("Offers API body rejected: {}", e);
            UpstreamError::Malformed(e.details().clone())
        })?;

        Ok(envelope.offers)
    }

    async fn lookup_geo(&self, ip: &str) -> Option<GeoInfo> {
        let geo = self.geo.as_ref()?;
        match geo.lookup(ip).await {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(ip = %ip, "Geolocation lookup failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::GeoInfo;
    use async_trait::async_trait;
    use relay_offer::FixedIndex;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct StubOffers {
        reply: Result<UpstreamReply, String>,
        calls: Mutex<Vec<OfferQuery>>,
    }

    impl StubOffers {
        fn json(status: u16, body: Value) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(UpstreamReply { status, body: body.to_string() }),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self { reply: Err("connection refused".to_string()), calls: Mutex::new(Vec::new()) })
        }

        fn calls(&self) -> Vec<OfferQuery> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl OfferSource for StubOffers {
        async fn fetch(
            &self,
            _api_key: &str,
            query: &OfferQuery,
        ) -> Result<UpstreamReply, Box<dyn std::error::Error + Send + Sync>> {
            self.calls.lock().unwrap().push(query.clone());
            self.reply.clone().map_err(Into::into)
        }
    }

    struct StubGeo {
        info: Option<GeoInfo>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GeoLookup for StubGeo {
        async fn lookup(&self, _ip: &str) -> Result<GeoInfo, Box<dyn std::error::Error + Send + Sync>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.info.clone().ok_or_else(|| "lookup timed out".into())
        }
    }

    fn geo(info: Option<GeoInfo>) -> Arc<StubGeo> {
        Arc::new(StubGeo { info, calls: AtomicUsize::new(0) })
    }

    fn settings() -> RelaySettings {
        RelaySettings { api_key: Some("key".to_string()), ..Default::default() }
    }

    fn offers_body() -> Value {
        json!({
            "success": true,
            "offers": [
                { "offerid": 1, "name": "One", "link": "https://ex.com/o?id=1", "country": "US,CA" },
                { "offerid": 2, "name": "Two", "link": "https://ex.com/o?id=2", "country": "PH" },
                { "offerid": 3, "name": "Three", "link": "https://ex.com/o?id=3" }
            ]
        })
    }

    fn browser() -> InboundRequest {
        InboundRequest::new()
            .with_header("user-agent", "Mozilla/5.0 (iPhone)")
            .with_header("x-forwarded-for", "81.2.69.142")
    }

    #[tokio::test]
    async fn test_missing_credential_makes_no_calls() {
        let offers = StubOffers::json(200, offers_body());
        let geo = geo(Some(GeoInfo::default()));
        let handler = OfferRedirectHandler::new(RelaySettings::default(), offers.clone()).with_geo(geo.clone());

        let err = handler.handle(&browser()).await.unwrap_err();
        assert!(matches!(err, RelayError::MissingCredential));
        assert!(offers.calls().is_empty());
        assert_eq!(geo.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bot_is_blocked_before_upstream() {
        let offers = StubOffers::json(200, offers_body());
        let handler = OfferRedirectHandler::new(settings(), offers.clone());

        let req = InboundRequest::new()
            .with_header("User-Agent", "UptimeRobot/2.0")
            .with_header("x-forwarded-for", "81.2.69.142")
            .with_query("country", "US");
        let err = handler.handle(&req).await.unwrap_err();
        assert!(matches!(err, RelayError::Blocked(BlockReason::Bot)));
        assert!(offers.calls().is_empty());
    }

    #[tokio::test]
    async fn test_vpn_is_blocked() {
        let offers = StubOffers::json(200, offers_body());
        let vpn = GeoInfo { vpn: true, ..Default::default() };
        let handler = OfferRedirectHandler::new(settings(), offers.clone()).with_geo(geo(Some(vpn)));

        let err = handler.handle(&browser()).await.unwrap_err();
        assert!(matches!(err, RelayError::Blocked(BlockReason::Vpn)));
        assert!(offers.calls().is_empty());
    }

    #[tokio::test]
    async fn test_geo_failure_is_swallowed() {
        let offers = StubOffers::json(200, offers_body());
        let geo = geo(None);
        let handler = OfferRedirectHandler::new(settings(), offers.clone())
            .with_geo(geo.clone())
            .with_random(Arc::new(FixedIndex(0)));

        let selection = handler.handle(&browser()).await.unwrap();
        assert_eq!(geo.calls.load(Ordering::SeqCst), 1);
        assert_eq!(selection.visitor.country, "");
        // unknown country keeps every offer with a country field
        assert_eq!(selection.offer_count, 2);
        assert_eq!(offers.calls()[0].get("country"), None);
    }

    #[tokio::test]
    async fn test_geo_fills_missing_country() {
        let offers = StubOffers::json(200, offers_body());
        let info = GeoInfo { country: Some("PH".to_string()), ..Default::default() };
        let handler = OfferRedirectHandler::new(settings(), offers.clone()).with_geo(geo(Some(info)));

        let selection = handler.handle(&browser()).await.unwrap();
        assert_eq!(selection.visitor.country, "PH");
        assert_eq!(selection.offer.id.as_deref(), Some("2"));
        assert_eq!(offers.calls()[0].get("country"), Some("PH"));
    }

    #[tokio::test]
    async fn test_fallback_ip_is_never_geolocated() {
        let offers = StubOffers::json(200, offers_body());
        let geo = geo(Some(GeoInfo { hosting: true, ..Default::default() }));
        let handler = OfferRedirectHandler::new(settings(), offers.clone()).with_geo(geo.clone());

        let req = InboundRequest::new()
            .with_header("user-agent", "Mozilla/5.0")
            .with_header("x-forwarded-for", "127.0.0.1")
            .with_header("x-vercel-ip-country", "us");
        let selection = handler.handle(&req).await.unwrap();

        assert_eq!(geo.calls.load(Ordering::SeqCst), 0);
        assert_eq!(selection.visitor.ip, "8.8.8.8");
        assert_eq!(selection.visitor.ip_source, IpSource::Fallback);
        assert_eq!(offers.calls()[0].get("ip"), Some("8.8.8.8"));
    }

    #[tokio::test]
    async fn test_selection_builds_tracking_link() {
        let offers = StubOffers::json(200, offers_body());
        let handler = OfferRedirectHandler::new(settings(), offers).with_random(Arc::new(FixedIndex(0)));

        let req = browser()
            .with_query("country", "us")
            .with_query("aff_sub4", "x")
            .with_query("aff_sub5", "y")
            .with_query("debug", "true");
        let selection = handler.handle(&req).await.unwrap();

        assert!(selection.debug);
        assert_eq!(selection.offer_count, 1);
        assert_eq!(selection.offer.name.as_deref(), Some("One"));
        assert_eq!(selection.link, "https://ex.com/o?id=1&aff_sub4=x&aff_sub5=y");
    }

    #[tokio::test]
    async fn test_user_agent_is_lowercased_for_upstream() {
        let offers = StubOffers::json(200, offers_body());
        let handler = OfferRedirectHandler::new(settings(), offers.clone());

        let selection = handler.handle(&browser().with_query("country", "PH")).await.unwrap();
        assert_eq!(selection.visitor.user_agent, "mozilla/5.0 (iphone)");
        assert_eq!(offers.calls()[0].get("user_agent"), Some("mozilla/5.0 (iphone)"));
    }

    #[tokio::test]
    async fn test_error_status_keeps_empty_body() {
        let offers = Arc::new(StubOffers {
            reply: Ok(UpstreamReply { status: 503, body: String::new() }),
            calls: Mutex::new(Vec::new()),
        });
        let handler = OfferRedirectHandler::new(settings(), offers);

        match handler.handle(&browser()).await.unwrap_err() {
            RelayError::Upstream(UpstreamError::Status { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_matching_offers() {
        let handler = OfferRedirectHandler::new(settings(), StubOffers::json(200, offers_body()));
        let err = handler.handle(&browser().with_query("country", "DE")).await.unwrap_err();
        assert_eq!(err.to_string(), "No active offers for country DE");
    }

    #[tokio::test]
    async fn test_upstream_failures() {
        let handler = OfferRedirectHandler::new(settings(), StubOffers::json(401, json!({ "error": "bad key" })));
        match handler.handle(&browser()).await.unwrap_err() {
            RelayError::Upstream(UpstreamError::Status { status, body }) => {
                assert_eq!(status, 401);
                assert!(body.contains("bad key"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let handler = OfferRedirectHandler::new(settings(), StubOffers::json(200, json!({ "success": false })));
        assert!(matches!(
            handler.handle(&browser()).await.unwrap_err(),
            RelayError::Upstream(UpstreamError::Malformed(_))
        ));

        let handler = OfferRedirectHandler::new(settings(), StubOffers::failing());
        assert!(matches!(
            handler.handle(&browser()).await.unwrap_err(),
            RelayError::Upstream(UpstreamError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_passthrough_forwards_allowed_params() {
        let offers = StubOffers::json(429, json!({ "success": false, "error": "slow down" }));
        let handler = OfferRedirectHandler::new(settings(), offers.clone());

        let req = InboundRequest::new()
            .with_query("country", "PH")
            .with_query("max", "5")
            .with_query("aff_sub4", "dropped")
            .with_query("type", "");
        let reply = handler.passthrough(&req).await.unwrap();

        assert_eq!(reply.status, 429);
        assert_eq!(reply.body["error"], "slow down");

        let query = &offers.calls()[0];
        assert_eq!(query.get("ip"), Some("8.8.8.8"));
        assert_eq!(query.get("user_agent"), Some(DEFAULT_USER_AGENT));
        assert_eq!(query.get("country"), Some("PH"));
        assert_eq!(query.get("max"), Some("5"));
        assert_eq!(query.get("type"), None);
        assert_eq!(query.get("aff_sub4"), None);
    }
}
