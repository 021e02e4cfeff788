use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tokio::sync::Mutex;

use crate::error::ApiError;
use crate::state::AppState;

use super::client_ip::limiter_key;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window request counter per client address.
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    windows: Mutex<HashMap<IpAddr, Window>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Count one request from `ip`; false once the window is used up.
    pub async fn check(&self, ip: IpAddr) -> bool {
        self.check_at(ip, Instant::now()).await
    }

    async fn check_at(&self, ip: IpAddr, now: Instant) -> bool {
        let mut windows = self.windows.lock().await;

        // Drop expired windows so the map does not grow without bound
        if windows.len() > 10_000 {
            let window = self.window;
            windows.retain(|_, w| now.duration_since(w.started) < window);
        }

        let entry = windows.entry(ip).or_insert(Window { started: now, count: 0 });
        if now.duration_since(entry.started) >= self.window {
            *entry = Window { started: now, count: 0 };
        }
        if entry.count >= self.max_requests {
            return false;
        }
        entry.count += 1;
        true
    }
}

pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, ApiError> {
    if let Some(ip) = limiter_key(&request, state.config.api.trust_proxy) {
        if !state.limiter.check(ip).await {
            tracing::warn!("Rate limit exceeded for {}", ip);
            return Err(ApiError::too_many_requests(
                "Too many reqs from this IP, please try again later",
            ));
        }
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blocks_after_limit_until_window_ends() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        let other: IpAddr = "10.0.0.2".parse().unwrap();
        let start = Instant::now();

        assert!(limiter.check_at(ip, start).await);
        assert!(limiter.check_at(ip, start).await);
        assert!(!limiter.check_at(ip, start + Duration::from_secs(1)).await);
        assert!(limiter.check_at(other, start).await);
        assert!(limiter.check_at(ip, start + Duration::from_secs(61)).await);
    }
}
