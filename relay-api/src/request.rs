use axum::extract::{ConnectInfo, Query, Request};
use relay_core::InboundRequest;
use std::collections::HashMap;
use std::net::SocketAddr;

/// Snapshot the parts of an HTTP request the relay looks at.
///
/// Headers that are not valid visible ASCII are skipped. A query string that
/// does not decode is treated as empty. The peer address is only present when
/// the server runs with connect info.
pub fn inbound(req: &Request) -> InboundRequest {
    let query = Query::<HashMap<String, String>>::try_from_uri(req.uri())
        .map(|Query(q)| q)
        .unwrap_or_default();
    let remote = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    req.headers()
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
        .fold(InboundRequest::new(), |acc, (name, value)| acc.with_header(name, value))
        .with_query_map(query)
        .with_remote_addr(remote)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_inbound_copies_headers_query_and_peer() {
        let mut req = Request::builder()
            .uri("/api/redirect?country=ph&debug=true")
            .header("X-Forwarded-For", "81.2.69.142, 10.0.0.1")
            .header("User-Agent", "Mozilla/5.0")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([203, 0, 113, 9], 4000))));

        let inbound = inbound(&req);
        assert_eq!(inbound.header("x-forwarded-for"), Some("81.2.69.142, 10.0.0.1"));
        assert_eq!(inbound.header("user-agent"), Some("Mozilla/5.0"));
        assert_eq!(inbound.query("country"), Some("ph"));
        assert!(inbound.wants_debug());
        assert_eq!(inbound.remote_addr(), Some("203.0.113.9".parse().unwrap()));
    }

    #[test]
    fn test_inbound_without_connect_info() {
        let req = Request::builder().uri("/api/redirect").body(Body::empty()).unwrap();
        let inbound = inbound(&req);
        assert_eq!(inbound.remote_addr(), None);
        assert_eq!(inbound.query("country"), None);
    }
}
