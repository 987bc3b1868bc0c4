//! Rate limiting and request correlation middleware.

use crate::metrics::METRICS;
use crate::response::ErrorResponse;
use crate::state::AppState;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

/// Windows are swept once this many clients are tracked.
const SWEEP_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    index: u64,
    hits: u32,
}

/// Fixed one-minute window counter per client address.
#[derive(Debug)]
pub struct RateLimiter {
    per_minute: u32,
    epoch: Instant,
    windows: DashMap<IpAddr, Window>,
}

impl RateLimiter {
    /// `per_minute == 0` disables limiting.
    pub fn new(per_minute: u32) -> Self {
        Self {
            per_minute,
            epoch: Instant::now(),
            windows: DashMap::new(),
        }
    }

    pub fn check(&self, client: IpAddr) -> bool {
        self.check_at(client, Instant::now())
    }

    pub fn check_at(&self, client: IpAddr, now: Instant) -> bool {
        if self.per_minute == 0 {
            return true;
        }
        let index = now.saturating_duration_since(self.epoch).as_secs() / 60;
        if self.windows.len() > SWEEP_THRESHOLD {
            self.windows.retain(|_, w| w.index == index);
        }

        let mut window = self.windows.entry(client).or_insert(Window { index, hits: 0 });
        if window.index != index {
            *window = Window { index, hits: 0 };
        }
        if window.hits >= self.per_minute {
            return false;
        }
        window.hits += 1;
        true
    }
}

/// Reject clients over their per-minute budget with 429.
/// In-process callers without a peer address are not limited.
pub async fn rate_limit(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    match client {
        Some(ip) if !state.rate_limiter.check(ip) => {
            METRICS.rate_limited.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(client = %ip, "Rate limit exceeded");
            (
                StatusCode::TOO_MANY_REQUESTS,
                axum::Json(ErrorResponse::new("too many requests")),
            )
                .into_response()
        }
        _ => next.run(request).await,
    }
}

/// Propagate or generate `x-request-id` for end-to-end correlation.
pub async fn inject_request_id(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| {
            use rand::Rng;
            let mut rng = rand::thread_rng();
            format!("rel-{:016x}", rng.gen::<u64>())
        });

    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;

    if let Ok(val) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", val);
    }

    response
}

/// Request correlation ID, extractable from `Request::extensions()`.
#[derive(Clone, Debug)]
pub struct RequestId(pub String);
