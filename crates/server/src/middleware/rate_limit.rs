//! Rate limiting middleware using governor and `tower_governor`.
//!
//! - `auth_rate_limiter`: sign-in code and passkey endpoints (~10/min)
//! - `upload_rate_limiter`: photo/video uploads and print renders (~20/min)

use std::net::IpAddr;
use std::sync::Arc;

use axum::http::Request;
use governor::clock::QuantaInstant;
use governor::middleware::NoOpMiddleware;
use tower_governor::{GovernorError, GovernorLayer, governor::GovernorConfigBuilder};

/// Client IP from proxy headers, in order of trust.
const IP_HEADERS: [&str; 4] = [
    "cf-connecting-ip",
    "fly-client-ip",
    "x-real-ip",
    "x-forwarded-for",
];

/// Key extractor that reads the client IP from Cloudflare/Fly.io proxy
/// headers, taking the first hop of `X-Forwarded-For`.
#[derive(Clone, Copy)]
pub struct ProxyIpKeyExtractor;

impl tower_governor::key_extractor::KeyExtractor for ProxyIpKeyExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        let headers = req.headers();
        IP_HEADERS
            .iter()
            .filter_map(|name| headers.get(*name))
            .filter_map(|v| v.to_str().ok())
            .filter_map(|s| s.split(',').next())
            .find_map(|s| s.trim().parse::<IpAddr>().ok())
            .ok_or(GovernorError::UnableToExtractKey)
    }
}

/// Rate limiter layer type for Axum.
pub type RateLimiterLayer =
    GovernorLayer<ProxyIpKeyExtractor, NoOpMiddleware<QuantaInstant>, axum::body::Body>;

fn limiter(replenish_seconds: u64, burst: u32) -> RateLimiterLayer {
    let config = GovernorConfigBuilder::default()
        .key_extractor(ProxyIpKeyExtractor)
        .per_second(replenish_seconds)
        .burst_size(burst)
        .finish()
        .expect("rate limiter config uses non-zero period and burst");
    GovernorLayer::new(Arc::new(config))
}

/// Auth endpoints: one token every 6 seconds, burst of 5.
///
/// # Panics
///
/// Never; the period and burst are non-zero constants.
#[must_use]
pub fn auth_rate_limiter() -> RateLimiterLayer {
    limiter(6, 5)
}

/// Upload and render endpoints: one token every 3 seconds, burst of 10.
///
/// # Panics
///
/// Never; the period and burst are non-zero constants.
#[must_use]
pub fn upload_rate_limiter() -> RateLimiterLayer {
    limiter(3, 10)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tower_governor::key_extractor::KeyExtractor;

    fn extract(headers: &[(&str, &str)]) -> Result<IpAddr, GovernorError> {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        ProxyIpKeyExtractor.extract(&builder.body(()).unwrap())
    }

    #[test]
    fn test_prefers_cloudflare_header() {
        let ip = extract(&[
            ("x-forwarded-for", "10.0.0.1"),
            ("cf-connecting-ip", "203.0.113.7"),
        ])
        .unwrap();
        assert_eq!(ip, "203.0.113.7".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_first_forwarded_hop() {
        let ip = extract(&[("x-forwarded-for", "198.51.100.2, 10.0.0.1")]).unwrap();
        assert_eq!(ip, "198.51.100.2".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_skips_garbage() {
        let ip = extract(&[("cf-connecting-ip", "nope"), ("x-real-ip", "192.0.2.9")]).unwrap();
        assert_eq!(ip, "192.0.2.9".parse::<IpAddr>().unwrap());
        assert!(extract(&[]).is_err());
    }
}
