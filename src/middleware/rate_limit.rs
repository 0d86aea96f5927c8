//! Token-bucket admission control keyed by client address.
//!
//! Buckets live in process memory for the lifetime of the process; idle
//! entries are swept out periodically. Horizontally scaled deployments would
//! back the same capacity/refill contract with a shared atomic store instead.

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::warn;

use crate::schemas::{AppState, ErrorResponse};

const DEFAULT_CAPACITY: u32 = 20;
const DEFAULT_WINDOW_SECS: u64 = 10;
/// Buckets idle for this many windows are dropped during a sweep.
const IDLE_WINDOWS: u32 = 30;
/// How many admission checks pass between sweeps.
const SWEEP_INTERVAL: u64 = 1024;

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

/// Outcome of one admission check, carrying the response header values.
#[derive(Debug, Clone, Copy)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Epoch seconds at which the bucket refills completely.
    pub reset: u64,
}

#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    window: Duration,
    buckets: DashMap<String, TokenBucket>,
    checks: AtomicU64,
}

impl RateLimiter {
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            capacity: f64::from(capacity.max(1)),
            window,
            buckets: DashMap::new(),
            checks: AtomicU64::new(0),
        }
    }

    /// Build a limiter from `RATE_LIMIT_MAX_REQUESTS` / `RATE_LIMIT_WINDOW_SECS`.
    pub fn from_env() -> Self {
        let capacity = std::env::var("RATE_LIMIT_MAX_REQUESTS")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(DEFAULT_CAPACITY);
        let window_secs = std::env::var("RATE_LIMIT_WINDOW_SECS")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(DEFAULT_WINDOW_SECS);
        Self::new(capacity, Duration::from_secs(window_secs))
    }

    fn refill_rate_per_sec(&self) -> f64 {
        self.capacity / self.window.as_secs_f64()
    }

    /// Take one token for `key`, refilling by elapsed time first.
    pub fn check(&self, key: &str) -> RateDecision {
        if self.checks.fetch_add(1, Ordering::Relaxed) % SWEEP_INTERVAL == SWEEP_INTERVAL - 1 {
            self.evict_idle();
        }

        let now = Instant::now();
        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket {
                tokens: self.capacity,
                last_refill: now,
            });

        let elapsed = now.saturating_duration_since(bucket.last_refill);
        if elapsed > Duration::ZERO {
            bucket.tokens =
                (bucket.tokens + elapsed.as_secs_f64() * self.refill_rate_per_sec())
                    .min(self.capacity);
            bucket.last_refill = now;
        }

        let allowed = bucket.tokens >= 1.0;
        if allowed {
            bucket.tokens -= 1.0;
        }

        let remaining = bucket.tokens.floor().max(0.0) as u32;
        let tokens_to_full = self.capacity - bucket.tokens;
        let secs_to_full = if tokens_to_full <= 0.0 {
            0.0
        } else {
            tokens_to_full / self.refill_rate_per_sec()
        };
        let reset = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs()
            + secs_to_full.ceil() as u64;

        RateDecision {
            allowed,
            limit: self.capacity as u32,
            remaining,
            reset,
        }
    }

    fn evict_idle(&self) {
        let idle_cutoff = self.window * IDLE_WINDOWS;
        let now = Instant::now();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_refill) < idle_cutoff);
    }

    #[cfg(test)]
    fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

/// Admission middleware: every response carries the limit headers; exhausted
/// buckets answer 429 with the same metadata.
pub async fn rate_limit(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let key = client_key(&req);
    let decision = state.limiter.check(&key);

    if !decision.allowed {
        warn!("Rate limit exceeded for client {}", key);
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorResponse {
                error: "Rate limit exceeded".to_string(),
                code: "RATE_LIMITED".to_string(),
                success: false,
            }),
        )
            .into_response();
        apply_headers(&mut response, decision);
        return response;
    }

    let mut response = next.run(req).await;
    apply_headers(&mut response, decision);
    response
}

fn apply_headers(response: &mut Response<Body>, decision: RateDecision) {
    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", header_value(decision.limit as u64));
    headers.insert("X-RateLimit-Remaining", header_value(decision.remaining as u64));
    headers.insert("X-RateLimit-Reset", header_value(decision.reset));
}

fn header_value(value: u64) -> HeaderValue {
    HeaderValue::from_str(&value.to_string())
        .unwrap_or_else(|_| HeaderValue::from_static("0"))
}

/// Client key: forwarded address when present, else the peer address.
fn client_key(req: &Request) -> String {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
