//! Per-operation attempt limiting with a sliding window.
//!
//! Sign-in and sign-up are keyed by client IP, deal creation by user id.

use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use dashmap::DashMap;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;
use crate::AppState;

/// Operation being limited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    SignIn,
    SignUp,
    CreateDeal,
}

#[derive(Debug, Clone)]
struct RateLimitEntry {
    /// Tokens remaining in the current window
    tokens: u32,
    window_start: Instant,
    /// Last attempt (for sliding window)
    last_request: Instant,
}

impl RateLimitEntry {
    fn new(max_tokens: u32) -> Self {
        let now = Instant::now();
        Self {
            tokens: max_tokens,
            window_start: now,
            last_request: now,
        }
    }
}

/// Thread-safe rate limiter using dashmap
#[derive(Debug)]
pub struct RateLimiter {
    /// Map of (subject, operation) -> entry
    entries: DashMap<(String, Operation), RateLimitEntry>,
    config: RateLimitConfig,
    window_duration: Duration,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            entries: DashMap::new(),
            window_duration: Duration::from_secs(config.window_minutes * 60),
            config,
        }
    }

    /// Consume one attempt for `subject`.
    /// Returns Ok(remaining) if allowed, Err(retry_after_seconds) if limited.
    pub fn check(&self, subject: &str, operation: Operation) -> Result<u32, u64> {
        if !self.config.enabled {
            return Ok(u32::MAX);
        }

        let max_tokens = self.max_attempts(operation);
        let now = Instant::now();

        let mut entry = self
            .entries
            .entry((subject.to_string(), operation))
            .or_insert_with(|| RateLimitEntry::new(max_tokens));

        let elapsed = now.duration_since(entry.window_start);
        if elapsed >= self.window_duration {
            entry.tokens = max_tokens;
            entry.window_start = now;
        } else {
            // Sliding window: replenish tokens by time elapsed since the last attempt
            let since_last = now.duration_since(entry.last_request);
            let replenish_rate = max_tokens as f64 / self.window_duration.as_secs_f64();
            let replenished = (since_last.as_secs_f64() * replenish_rate) as u32;
            entry.tokens = entry.tokens.saturating_add(replenished).min(max_tokens);
        }

        entry.last_request = now;

        if entry.tokens > 0 {
            entry.tokens -= 1;
            Ok(entry.tokens)
        } else {
            let retry_after = self.window_duration.saturating_sub(elapsed).as_secs().max(1);
            tracing::debug!(subject, ?operation, retry_after, "Rate limit reached");
            Err(retry_after)
        }
    }

    fn max_attempts(&self, operation: Operation) -> u32 {
        match operation {
            Operation::SignIn => self.config.sign_in_attempts,
            Operation::SignUp => self.config.sign_up_attempts,
            Operation::CreateDeal => self.config.deal_creations,
        }
    }

    /// Drop entries older than two windows
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        let expiry = self.window_duration * 2;

        self.entries
            .retain(|_, entry| now.duration_since(entry.window_start) < expiry);
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

/// Client IP for rate limiting.
///
/// Proxy headers are only read when `trusted`; otherwise the peer address
/// of the connection wins. Loopback is the last resort when neither is known.
pub fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>, trusted: bool) -> IpAddr {
    if trusted {
        if let Some(ip) = forwarded_ip(headers) {
            return ip;
        }
    }
    peer.unwrap_or(IpAddr::from([127, 0, 0, 1]))
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    // Original client is the first X-Forwarded-For entry
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<IpAddr>().ok())
        })
}

/// Extracts the rate-limit key of the caller
pub struct ClientIp(pub IpAddr);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip());
        Ok(ClientIp(client_ip(
            &parts.headers,
            peer,
            state.config.server.trust_proxy_headers,
        )))
    }
}

/// Periodically evict stale rate limit entries
pub fn spawn_cleanup_task(rate_limiter: Arc<RateLimiter>, cleanup_interval_secs: u64) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(cleanup_interval_secs.max(1));
        loop {
            tokio::time::sleep(interval).await;
            rate_limiter.cleanup_expired();
            tracing::debug!(
                "Rate limiter cleanup complete, {} entries remaining",
                rate_limiter.entry_count()
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            window_minutes: 1,
            sign_in_attempts: 3,
            sign_up_attempts: 2,
            deal_creations: 5,
            cleanup_interval_secs: 300,
        }
    }

    #[test]
    fn test_allows_attempts_under_limit() {
        let limiter = RateLimiter::new(test_config());
        for i in 0..3 {
            assert!(
                limiter.check("10.0.0.1", Operation::SignIn).is_ok(),
                "Attempt {} should be allowed",
                i
            );
        }
    }

    #[test]
    fn test_blocks_after_limit() {
        let limiter = RateLimiter::new(test_config());
        for _ in 0..3 {
            let _ = limiter.check("10.0.0.1", Operation::SignIn);
        }

        let retry_after = limiter.check("10.0.0.1", Operation::SignIn).unwrap_err();
        assert!(retry_after >= 1 && retry_after <= 60);
    }

    #[test]
    fn test_subjects_and_operations_are_separate() {
        let limiter = RateLimiter::new(test_config());
        for _ in 0..2 {
            let _ = limiter.check("10.0.0.1", Operation::SignUp);
        }
        assert!(limiter.check("10.0.0.1", Operation::SignUp).is_err());
        assert!(limiter.check("10.0.0.2", Operation::SignUp).is_ok());
        assert!(limiter.check("10.0.0.1", Operation::SignIn).is_ok());
    }

    #[test]
    fn test_disabled_allows_everything() {
        let mut config = test_config();
        config.enabled = false;
        let limiter = RateLimiter::new(config);
        for _ in 0..100 {
            assert!(limiter.check("user-1", Operation::CreateDeal).is_ok());
        }
        assert_eq!(limiter.entry_count(), 0);
    }

    #[test]
    fn test_cleanup_keeps_recent_entries() {
        let limiter = RateLimiter::new(test_config());
        let _ = limiter.check("user-1", Operation::CreateDeal);
        assert_eq!(limiter.entry_count(), 1);

        limiter.cleanup_expired();
        assert_eq!(limiter.entry_count(), 1);
    }

    fn forwarded_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "10.1.1.1".parse().unwrap());
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        headers
    }

    #[test]
    fn test_client_ip_ignores_proxy_headers_by_default() {
        let peer: IpAddr = "198.51.100.4".parse().unwrap();
        assert_eq!(client_ip(&forwarded_headers(), Some(peer), false), peer);
        assert_eq!(
            client_ip(&forwarded_headers(), None, false),
            IpAddr::from([127, 0, 0, 1])
        );
    }

    #[test]
    fn test_client_ip_from_trusted_proxy_headers() {
        let peer: IpAddr = "10.0.0.1".parse().unwrap();
        let mut headers = forwarded_headers();
        assert_eq!(
            client_ip(&headers, Some(peer), true),
            "203.0.113.7".parse::<IpAddr>().unwrap()
        );

        headers.remove("x-forwarded-for");
        assert_eq!(
            client_ip(&headers, Some(peer), true),
            "10.1.1.1".parse::<IpAddr>().unwrap()
        );

        assert_eq!(client_ip(&HeaderMap::new(), Some(peer), true), peer);
    }

    #[tokio::test]
    async fn test_extractor_reads_connect_info() {
        let db = crate::db::init_in_memory().await.unwrap();
        let state = Arc::new(AppState::new(crate::config::Config::default(), db));

        let (mut parts, _) = axum::http::Request::builder()
            .uri("/auth/sign-in")
            .header("x-forwarded-for", "203.0.113.7")
            .body(())
            .unwrap()
            .into_parts();
        let peer: SocketAddr = "198.51.100.4:50000".parse().unwrap();
        parts.extensions.insert(ConnectInfo(peer));

        let ClientIp(ip) = ClientIp::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(ip, peer.ip());
    }
}
