//! Client metadata recorded on sessions.
//!
//! The client address is the socket peer unless the peer is a configured
//! trusted proxy, in which case the nearest untrusted hop of
//! `x-forwarded-for` (or `x-real-ip`) is used. Header values that do not
//! parse as an IP address are ignored.

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, header::USER_AGENT, request::Parts},
};
use warden::auth::SessionMetadata;

use super::AppState;

const UNKNOWN: &str = "unknown";

/// Longest user agent stored on a session
pub const MAX_USER_AGENT_LENGTH: usize = 512;

/// User agent and client IP of the current request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientMeta {
    pub user_agent: String,
    pub ip_address: String,
}

impl ClientMeta {
    fn from_parts(headers: &HeaderMap, peer: Option<SocketAddr>, trusted: &[IpAddr]) -> Self {
        let user_agent = headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(truncate_user_agent)
            .unwrap_or_else(|| UNKNOWN.to_string());

        let peer_ip = peer.map(|addr| addr.ip());
        let client_ip = match peer_ip {
            Some(ip) if trusted.contains(&ip) => forwarded_client(headers, trusted).or(Some(ip)),
            other => other,
        };

        Self {
            user_agent,
            ip_address: client_ip.map_or_else(|| UNKNOWN.to_string(), |ip| ip.to_string()),
        }
    }

    pub fn metadata(&self) -> SessionMetadata {
        SessionMetadata::new(self.user_agent.clone(), self.ip_address.clone())
    }
}

/// Nearest hop not belonging to a trusted proxy, read right to left
fn forwarded_client(headers: &HeaderMap, trusted: &[IpAddr]) -> Option<IpAddr> {
    if let Some(chain) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        for hop in chain.rsplit(',') {
            let Ok(ip) = hop.trim().parse::<IpAddr>() else {
                return None;
            };
            if !trusted.contains(&ip) {
                return Some(ip);
            }
        }
        return None;
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn truncate_user_agent(value: &str) -> String {
    match value.char_indices().nth(MAX_USER_AGENT_LENGTH) {
        Some((end, _)) => value[..end].to_string(),
        None => value.to_string(),
    }
}

impl FromRequestParts<AppState> for ClientMeta {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self::from_parts(&parts.headers, peer, &state.trusted_proxies))
    }
}
