use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::ApiResponse;

/// Per-tier config plus per-IP request timestamps.
type TierMap = DashMap<&'static str, (RateLimitConfig, DashMap<IpAddr, Vec<Instant>>)>;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

/// In-memory per-IP sliding-window rate limiter with named tiers.
/// All API instances limit independently; there is no shared store.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    tiers: Arc<TierMap>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            tiers: Arc::new(DashMap::new()),
        }
    }

    pub fn add_tier(&self, name: &'static str, config: RateLimitConfig) {
        self.tiers.insert(name, (config, DashMap::new()));
    }

    /// `Ok(())` if the request is allowed, `Err(retry_after_secs)` if not.
    pub fn check(&self, tier: &'static str, ip: IpAddr) -> Result<(), u64> {
        let tier_entry = self.tiers.get(tier).expect("unknown rate limit tier");
        let (config, ip_map) = tier_entry.value();
        let now = Instant::now();
        let window_start = now - config.window;

        let mut entry = ip_map.entry(ip).or_default();
        entry.retain(|t| *t > window_start);

        if entry.len() >= config.max_requests as usize {
            let oldest = entry[0];
            let retry_after = (oldest + config.window)
                .saturating_duration_since(now)
                .as_secs()
                .max(1);
            return Err(retry_after);
        }

        entry.push(now);
        Ok(())
    }

    /// Drop IP entries idle for more than twice their tier's window.
    /// Driven by a periodic background task.
    pub fn cleanup(&self) {
        let now = Instant::now();
        for tier_entry in self.tiers.iter() {
            let (config, ip_map) = tier_entry.value();
            let cutoff = config.window * 2;
            ip_map.retain(|_ip, timestamps| {
                timestamps.retain(|t| now.duration_since(*t) < cutoff);
                !timestamps.is_empty()
            });
        }
    }
}

/// Client IP: X-Forwarded-For when behind a reverse proxy, else the
/// socket address.
fn client_ip(req: &Request) -> IpAddr {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            if let Ok(ip) = first.trim().parse::<IpAddr>() {
                return ip;
            }
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip())
        .unwrap_or_else(|| IpAddr::from([127, 0, 0, 1]))
}

/// Tier-parameterized middleware; attach with
/// `from_fn_with_state((limiter, "tier"), rate_limit)`.
pub async fn rate_limit(
    State((limiter, tier)): State<(RateLimiter, &'static str)>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    let ip = client_ip(&req);
    limiter.check(tier, ip).map_err(|retry_after| {
        let body = ApiResponse::<()>::error(format!(
            "Too many requests. Try again in {} seconds",
            retry_after
        ));
        (
            StatusCode::TOO_MANY_REQUESTS,
            [("Retry-After", retry_after.to_string())],
            Json(body),
        )
            .into_response()
    })?;
    Ok(next.run(req).await)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::thread::sleep;

    fn test_ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    fn limiter(max: u32, window: Duration) -> RateLimiter {
        let l = RateLimiter::new();
        l.add_tier(
            "test",
            RateLimitConfig {
                max_requests: max,
                window,
            },
        );
        l
    }

    #[test]
    fn test_allows_under_limit_then_rejects() {
        let l = limiter(2, Duration::from_secs(60));
        let ip = test_ip(1);
        assert!(l.check("test", ip).is_ok());
        assert!(l.check("test", ip).is_ok());
        assert!(l.check("test", ip).is_err());
    }

    #[test]
    fn test_retry_after_bounded_by_window() {
        let l = limiter(1, Duration::from_secs(60));
        let ip = test_ip(1);
        l.check("test", ip).unwrap();
        let retry_after = l.check("test", ip).unwrap_err();
        assert!((1..=60).contains(&retry_after));
    }

    #[test]
    fn test_ips_and_tiers_independent() {
        let l = limiter(1, Duration::from_secs(60));
        l.add_tier(
            "other",
            RateLimitConfig {
                max_requests: 1,
                window: Duration::from_secs(60),
            },
        );
        let ip = test_ip(1);
        assert!(l.check("test", ip).is_ok());
        assert!(l.check("test", ip).is_err());
        assert!(l.check("test", test_ip(2)).is_ok());
        assert!(l.check("other", ip).is_ok());
    }

    #[test]
    fn test_window_expiry_allows_again() {
        let l = limiter(1, Duration::from_millis(100));
        let ip = test_ip(1);
        assert!(l.check("test", ip).is_ok());
        assert!(l.check("test", ip).is_err());
        sleep(Duration::from_millis(150));
        assert!(l.check("test", ip).is_ok());
    }

    #[test]
    fn test_cleanup_drops_stale_keeps_active() {
        let l = limiter(10, Duration::from_millis(50));
        let stale = test_ip(1);
        l.check("test", stale).unwrap();
        sleep(Duration::from_millis(120));

        let active = test_ip(2);
        l.check("test", active).unwrap();

        l.cleanup();

        assert!(l.check("test", stale).is_ok());
        assert!(l.check("test", active).is_ok());
    }
}
