//! Access logging middleware.
//!
//! Logs one structured record per request: status, method, path (with query
//! string when present), client address, and wall-clock latency.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;

/// Shared state for the access log: the proxies whose forwarding headers we
/// trust.
#[derive(Debug, Default)]
pub struct AccessLogState {
    pub trusted_proxies: Vec<IpAddr>,
}

pub async fn access_log(
    State(state): State<Arc<AccessLogState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = match req.uri().query() {
        Some(query) => format!("{}?{query}", req.uri().path()),
        None => req.uri().path().to_string(),
    };
    let ip = client_ip(peer, req.headers(), &state.trusted_proxies);

    let response = next.run(req).await;

    tracing::info!(
        status = response.status().as_u16(),
        method = %method,
        path = %path,
        ip = %ip,
        latency = ?start.elapsed(),
        "http request"
    );

    response
}

/// Resolve the client address. `X-Forwarded-For` is honored only when the
/// socket peer is a trusted proxy; an empty trust list means the peer address
/// is always used.
pub fn client_ip(peer: SocketAddr, headers: &HeaderMap, trusted: &[IpAddr]) -> IpAddr {
    if !trusted.contains(&peer.ip()) {
        return peer.ip();
    }
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok())
        .unwrap_or_else(|| peer.ip())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer(addr: &str) -> SocketAddr {
        addr.parse().unwrap()
    }

    fn forwarded(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn empty_trust_list_ignores_forwarded_header() {
        let headers = forwarded("203.0.113.9");
        let ip = client_ip(peer("10.0.0.1:4567"), &headers, &[]);
        assert_eq!(ip, "10.0.0.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn trusted_peer_uses_forwarded_header() {
        let headers = forwarded("203.0.113.9, 10.0.0.1");
        let trusted = vec!["10.0.0.1".parse().unwrap()];
        let ip = client_ip(peer("10.0.0.1:4567"), &headers, &trusted);
        assert_eq!(ip, "203.0.113.9".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn untrusted_peer_keeps_socket_address() {
        let headers = forwarded("203.0.113.9");
        let trusted = vec!["10.0.0.1".parse().unwrap()];
        let ip = client_ip(peer("192.168.1.5:9999"), &headers, &trusted);
        assert_eq!(ip, "192.168.1.5".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn malformed_forwarded_header_falls_back_to_peer() {
        let headers = forwarded("not-an-address");
        let trusted = vec!["10.0.0.1".parse().unwrap()];
        let ip = client_ip(peer("10.0.0.1:4567"), &headers, &trusted);
        assert_eq!(ip, "10.0.0.1".parse::<IpAddr>().unwrap());
    }
}
