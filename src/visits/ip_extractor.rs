//! Client IP extraction from HTTP headers
//!
//! Resolution depends on the configured proxy trust mode:
//! - `none`: socket peer address only
//! - `standard`: RFC 7239 `Forwarded`, then `X-Forwarded-For`
//! - `cloudflare`: `CF-Connecting-IP`
//!
//! Every mode falls back to the socket peer address when its headers are
//! missing or unparseable.

use axum::http::HeaderMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::debug;

use crate::config::{TrustedProxyMode, VisitConfig};

/// Extract the client IP address for a request.
///
/// Returns `None` only when no header applies and the peer address is unknown.
pub fn extract_client_ip(
    headers: &HeaderMap,
    peer: Option<IpAddr>,
    config: &VisitConfig,
) -> Option<IpAddr> {
    let from_headers = match config.trusted_proxy_mode {
        TrustedProxyMode::Cloudflare => {
            let ip = extract_cloudflare_ip(headers);
            if ip.is_none() {
                debug!("CF-Connecting-IP header missing in Cloudflare mode, using socket address");
            }
            ip
        }
        TrustedProxyMode::Standard => extract_from_forwarded(headers)
            .or_else(|| extract_from_x_forwarded_for(headers, config.num_trusted_proxies)),
        TrustedProxyMode::None => None,
    };

    from_headers.or(peer)
}

fn extract_cloudflare_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("cf-connecting-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
}

/// Parse the first `for=` parameter of an RFC 7239 Forwarded header
fn extract_from_forwarded(headers: &HeaderMap) -> Option<IpAddr> {
    let forwarded = headers.get("forwarded")?.to_str().ok()?;

    // Forwarded: for=192.0.2.60;proto=http, for="[2001:db8::1]:4711"
    for element in forwarded.split(',') {
        for param in element.split(';') {
            let param = param.trim();
            let Some(value) = param
                .strip_prefix("for=")
                .or_else(|| param.strip_prefix("For="))
            else {
                continue;
            };

            let value = value.trim_matches('"');
            let ip_str = if let Some(bracketed) = value.strip_prefix('[') {
                bracketed.split(']').next().unwrap_or(bracketed)
            } else if value.matches(':').count() == 1 {
                // IPv4 with port
                value.split(':').next().unwrap_or(value)
            } else {
                value
            };

            if let Ok(ip) = ip_str.parse::<IpAddr>() {
                return Some(ip);
            }
        }
    }

    None
}

/// Parse X-Forwarded-For, skipping `num_trusted` proxy hops from the right
fn extract_from_x_forwarded_for(headers: &HeaderMap, num_trusted: Option<usize>) -> Option<IpAddr> {
    let xff = headers.get("x-forwarded-for")?.to_str().ok()?;

    let ips: Vec<IpAddr> = xff
        .split(',')
        .filter_map(|s| s.trim().parse::<IpAddr>().ok())
        .collect();

    match num_trusted {
        Some(n) if ips.len() > n => Some(ips[ips.len() - n - 1]),
        // No hop count, or not enough hops in the chain: leftmost entry
        _ => ips.first().copied(),
    }
}

/// Anonymize an IP address by truncating to its network prefix
///
/// - IPv4: /24 (zero last octet)
/// - IPv6: /48 (zero last 80 bits)
pub fn anonymize_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(addr) => {
            let [a, b, c, _] = addr.octets();
            IpAddr::V4(Ipv4Addr::new(a, b, c, 0))
        }
        IpAddr::V6(addr) => {
            let s = addr.segments();
            IpAddr::V6(Ipv6Addr::new(s[0], s[1], s[2], 0, 0, 0, 0, 0))
        }
    }
}
