//! Visit event capture for pixel requests

pub mod ip_extractor;

use axum::http::{header, HeaderMap};
use std::net::IpAddr;

use crate::config::VisitConfig;
use crate::models::NewVisit;

pub use ip_extractor::{anonymize_ip, extract_client_ip};

/// Build the visit event for a pixel fetch of `tracker_id`.
///
/// The timestamp is left to storage, which assigns it at insert time.
pub fn capture_visit(
    tracker_id: &str,
    headers: &HeaderMap,
    peer: Option<IpAddr>,
    config: &VisitConfig,
) -> NewVisit {
    let ip_address = extract_client_ip(headers, peer, config).map(|ip| {
        if config.ip_anonymization {
            anonymize_ip(ip)
        } else {
            ip
        }
    });

    NewVisit {
        tracker_id: tracker_id.to_string(),
        ip_address: ip_address.map(|ip| ip.to_string()),
        user_agent: header_value(headers, header::USER_AGENT.as_str()),
        referer: referer_from_headers(headers),
    }
}

/// `Referer`, or the correctly spelled `Referrer` some clients send
pub fn referer_from_headers(headers: &HeaderMap) -> Option<String> {
    header_value(headers, header::REFERER.as_str()).or_else(|| header_value(headers, "referrer"))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrustedProxyMode;
    use axum::http::HeaderValue;

    #[test]
    fn test_capture_reads_request_metadata() {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static("Mozilla/5.0"));
        headers.insert(header::REFERER, HeaderValue::from_static("http://x.com"));

        let visit = capture_visit(
            "abc",
            &headers,
            Some("198.51.100.4".parse().unwrap()),
            &VisitConfig::default(),
        );

        assert_eq!(visit.tracker_id, "abc");
        assert_eq!(visit.ip_address.as_deref(), Some("198.51.100.4"));
        assert_eq!(visit.user_agent.as_deref(), Some("Mozilla/5.0"));
        assert_eq!(visit.referer.as_deref(), Some("http://x.com"));
    }

    #[test]
    fn test_referrer_spelling_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert("referrer", HeaderValue::from_static("http://y.com"));
        assert_eq!(referer_from_headers(&headers).as_deref(), Some("http://y.com"));
    }

    #[test]
    fn test_missing_metadata_is_absent() {
        let config = VisitConfig {
            trusted_proxy_mode: TrustedProxyMode::None,
            ..VisitConfig::default()
        };
        let visit = capture_visit("abc", &HeaderMap::new(), None, &config);

        assert!(visit.ip_address.is_none());
        assert!(visit.user_agent.is_none());
        assert!(visit.referer.is_none());
    }

    #[test]
    fn test_anonymization_applies_to_stored_ip() {
        let config = VisitConfig {
            ip_anonymization: true,
            ..VisitConfig::default()
        };
        let visit = capture_visit(
            "abc",
            &HeaderMap::new(),
            Some("192.168.1.100".parse().unwrap()),
            &config,
        );
        assert_eq!(visit.ip_address.as_deref(), Some("192.168.1.0"));
    }
}
