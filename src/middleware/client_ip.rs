use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts, Request},
    http::{request::Parts, Extensions, HeaderMap},
};

use crate::error::ApiError;

/// Client address: first `X-Forwarded-For` entry, else the socket peer.
pub fn client_addr(headers: &HeaderMap, extensions: &Extensions) -> Option<IpAddr> {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        let first = forwarded.to_str().ok()?.split(',').next()?.trim();
        return first.parse().ok();
    }
    socket_peer(extensions)
}

/// Address of the TCP peer, ignoring any headers.
pub fn socket_peer(extensions: &Extensions) -> Option<IpAddr> {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// Address that requests are counted against. `X-Forwarded-For` is set by
/// the client unless a proxy in front rewrites it, so it only counts when
/// `trust_proxy` is on.
pub fn limiter_key(request: &Request, trust_proxy: bool) -> Option<IpAddr> {
    if trust_proxy {
        client_addr(request.headers(), request.extensions())
    } else {
        socket_peer(request.extensions())
    }
}

/// IPv4 form of a client address. Loopback `::1` and IPv4-mapped IPv6
/// addresses are unwrapped; any other IPv6 address has no IPv4 form.
pub fn normalize_ipv4(ip: IpAddr) -> Option<Ipv4Addr> {
    match ip {
        IpAddr::V4(v4) => Some(v4),
        IpAddr::V6(v6) if v6.is_loopback() => Some(Ipv4Addr::LOCALHOST),
        IpAddr::V6(v6) => v6.to_ipv4_mapped(),
    }
}

/// Validated IPv4 client address for hit tracking.
#[derive(Debug, Clone, Copy)]
pub struct ClientIp(pub Ipv4Addr);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        client_addr(&parts.headers, &parts.extensions)
            .and_then(normalize_ipv4)
            .map(ClientIp)
            .ok_or_else(|| ApiError::bad_request("ip not validated"))
    }
}
