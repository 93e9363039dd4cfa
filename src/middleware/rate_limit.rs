//! Per-IP rate limiting with governor.
//!
//! Two independent budgets: one for every route, and a tighter one for the
//! credential endpoints under `/auth`.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use governor::{
    clock::{Clock, DefaultClock},
    middleware::NoOpMiddleware,
    state::keyed::DashMapStateStore,
    Quota, RateLimiter,
};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
    time::Duration,
};
use tracing::warn;

use crate::config::SecurityConfig;
use crate::error::ApiError;

pub type KeyedRateLimiter =
    RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock, NoOpMiddleware>;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_window: u32,
    pub window_secs: u64,
    pub burst_size: u32,
}

impl RateLimitConfig {
    pub fn per_minute(requests: u32) -> Self {
        Self {
            requests_per_window: requests,
            window_secs: 60,
            burst_size: (requests / 2).max(1),
        }
    }

    /// Returns `None` when the numbers do not describe a usable quota.
    pub fn create_limiter(&self) -> Option<Arc<KeyedRateLimiter>> {
        if self.requests_per_window == 0 || self.window_secs == 0 {
            return None;
        }

        let replenish_ns =
            (self.window_secs as u128 * 1_000_000_000) / self.requests_per_window as u128;
        let quota = Quota::with_period(Duration::from_nanos(replenish_ns as u64))?
            .allow_burst(NonZeroU32::new(self.burst_size.max(1))?);

        Some(Arc::new(RateLimiter::dashmap(quota)))
    }
}

#[derive(Clone, Default)]
pub struct RateLimitState {
    pub global_limiter: Option<Arc<KeyedRateLimiter>>,
    pub auth_limiter: Option<Arc<KeyedRateLimiter>>,
    pub global_limit: u32,
    pub auth_limit: u32,
}

impl RateLimitState {
    pub fn from_config(security: &SecurityConfig) -> Self {
        if !security.rate_limiting_enabled {
            return Self::disabled();
        }

        let global = RateLimitConfig::per_minute(security.rate_limit_requests_per_minute);
        let auth = RateLimitConfig::per_minute(security.auth_rate_limit_requests_per_minute);

        Self {
            global_limiter: global.create_limiter(),
            auth_limiter: auth.create_limiter(),
            global_limit: global.requests_per_window,
            auth_limit: auth.requests_per_window,
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }
}

#[derive(Debug)]
pub struct RateLimitExceeded {
    pub message: &'static str,
    pub retry_after_secs: u64,
}

impl IntoResponse for RateLimitExceeded {
    fn into_response(self) -> Response {
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ApiError::new(self.message, "RATE_LIMITED")),
        )
            .into_response();

        if let Ok(value) = HeaderValue::from_str(&self.retry_after_secs.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}

fn client_ip(req: &Request) -> IpAddr {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

async fn enforce(
    limiter: Option<&Arc<KeyedRateLimiter>>,
    limit: u32,
    message: &'static str,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitExceeded> {
    let Some(limiter) = limiter else {
        return Ok(next.run(request).await);
    };

    let ip = client_ip(&request);
    if let Err(not_until) = limiter.check_key(&ip) {
        let retry_after_secs = not_until
            .wait_time_from(DefaultClock::default().now())
            .as_secs()
            .max(1);
        warn!(ip = %ip, retry_after_secs, "{}", message);
        return Err(RateLimitExceeded {
            message,
            retry_after_secs,
        });
    }

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&limit.to_string()) {
        response.headers_mut().insert("X-RateLimit-Limit", value);
    }
    Ok(response)
}

pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitExceeded> {
    enforce(
        state.global_limiter.as_ref(),
        state.global_limit,
        "Too many requests",
        request,
        next,
    )
    .await
}

pub async fn auth_rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitExceeded> {
    enforce(
        state.auth_limiter.as_ref(),
        state.auth_limit,
        "Too many authentication attempts",
        request,
        next,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_per_minute_config() {
        let config = RateLimitConfig::per_minute(120);
        assert_eq!(config.requests_per_window, 120);
        assert_eq!(config.window_secs, 60);
        assert_eq!(config.burst_size, 60);
        assert!(config.create_limiter().is_some());
    }

    #[test]
    fn test_zero_rate_disables_limiter() {
        assert!(RateLimitConfig::per_minute(0).create_limiter().is_none());
    }

    #[test]
    fn test_state_follows_security_config() {
        let mut config = Config::default_for_testing();
        config.security.rate_limiting_enabled = false;
        let state = RateLimitState::from_config(&config.security);
        assert!(state.global_limiter.is_none());
        assert!(state.auth_limiter.is_none());

        config.security.rate_limiting_enabled = true;
        let state = RateLimitState::from_config(&config.security);
        assert!(state.global_limiter.is_some());
        assert!(state.auth_limiter.is_some());
    }

    #[test]
    fn test_rate_limit_exceeded_response() {
        let response = RateLimitExceeded {
            message: "Too many requests",
            retry_after_secs: 7,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "7");
    }

    #[test]
    fn test_per_ip_keyed_limiter() {
        let config = RateLimitConfig {
            requests_per_window: 2,
            window_secs: 60,
            burst_size: 2,
        };
        let limiter = config.create_limiter().unwrap();

        let ip1: IpAddr = "1.2.3.4".parse().unwrap();
        let ip2: IpAddr = "5.6.7.8".parse().unwrap();

        assert!(limiter.check_key(&ip1).is_ok());
        assert!(limiter.check_key(&ip1).is_ok());
        assert!(limiter.check_key(&ip1).is_err());

        assert!(limiter.check_key(&ip2).is_ok());
    }
}
