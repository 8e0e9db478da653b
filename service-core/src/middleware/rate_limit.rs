use crate::error::AppError;
use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use std::{
    net::{IpAddr, SocketAddr},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

/// Result of counting one hit against a fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    pub hits: u64,
    /// Seconds until the window resets.
    pub resets_in: u64,
}

/// Keyed fixed-window counter shared by every instance of a service.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increments `key`, starting a new window of length `window` when none
    /// is open, and returns the count inside the current window.
    async fn hit(&self, key: &str, window: Duration) -> Result<WindowCount, anyhow::Error>;
}

/// Redis-backed counters. Each hit runs `SET key 0 EX window NX`, `INCR` and
/// `TTL` in one `MULTI`/`EXEC`, so a counter never exists without an expiry.
#[derive(Clone)]
pub struct RedisCounterStore {
    manager: ConnectionManager,
}

impl RedisCounterStore {
    pub async fn connect(url: &str) -> Result<Self, AppError> {
        let client = redis::Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        tracing::info!("Rate limit counters backed by Redis");
        Ok(Self { manager })
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn hit(&self, key: &str, window: Duration) -> Result<WindowCount, anyhow::Error> {
        let mut conn = self.manager.clone();
        let window_secs = window.as_secs().max(1);

        let (hits, ttl): (u64, i64) = window_pipeline(key, window_secs)
            .query_async(&mut conn)
            .await?;
        let resets_in = if ttl > 0 { ttl as u64 } else { window_secs };

        Ok(WindowCount { hits, resets_in })
    }
}

fn window_pipeline(key: &str, window_secs: u64) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic()
        .cmd("SET")
        .arg(key)
        .arg(0)
        .arg("EX")
        .arg(window_secs)
        .arg("NX")
        .ignore()
        .cmd("INCR")
        .arg(key)
        .cmd("TTL")
        .arg(key);
    pipe
}

const DEFAULT_SWEEP_EVERY: u64 = 1024;

#[derive(Debug, Clone, Copy)]
struct Window {
    hits: u64,
    started: Instant,
    length: Duration,
}

impl Window {
    fn expired(&self, now: Instant) -> bool {
        now.duration_since(self.started) >= self.length
    }
}

/// Process-local counters for tests and single-instance development.
///
/// Expired windows are dropped by a sweep that runs every `sweep_every`
/// hits, so one entry per client does not outlive its window for long.
pub struct InMemoryCounterStore {
    windows: DashMap<String, Window>,
    hits_since_sweep: AtomicU64,
    sweep_every: u64,
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_EVERY)
    }
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sweep_interval(sweep_every: u64) -> Self {
        Self {
            windows: DashMap::new(),
            hits_since_sweep: AtomicU64::new(0),
            sweep_every: sweep_every.max(1),
        }
    }

    /// Number of live and not-yet-swept windows.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Drops every window that has run out at `now`.
    pub fn evict_expired(&self, now: Instant) {
        self.windows.retain(|_, window| !window.expired(now));
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn hit(&self, key: &str, window: Duration) -> Result<WindowCount, anyhow::Error> {
        let now = Instant::now();

        let count = {
            let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
                hits: 0,
                started: now,
                length: window,
            });
            let current = entry.value_mut();
            if current.expired(now) {
                current.hits = 0;
                current.started = now;
                current.length = window;
            }
            current.hits += 1;

            let elapsed = now.duration_since(current.started);
            WindowCount {
                hits: current.hits,
                resets_in: window.saturating_sub(elapsed).as_secs().max(1),
            }
        };

        // The entry guard is released above; retain locks every shard.
        if self.hits_since_sweep.fetch_add(1, Ordering::Relaxed) + 1 >= self.sweep_every {
            self.hits_since_sweep.store(0, Ordering::Relaxed);
            self.evict_expired(now);
        }

        Ok(count)
    }
}

/// A named limit applied per client IP.
#[derive(Clone)]
pub struct RouteRateLimiter {
    store: Arc<dyn CounterStore>,
    scope: &'static str,
    limit: u64,
    window: Duration,
}

impl RouteRateLimiter {
    pub fn new(
        store: Arc<dyn CounterStore>,
        scope: &'static str,
        limit: u32,
        window_seconds: u64,
    ) -> Self {
        Self {
            store,
            scope,
            limit: u64::from(limit.max(1)),
            window: Duration::from_secs(window_seconds.max(1)),
        }
    }

    pub fn scope(&self) -> &'static str {
        self.scope
    }

    fn key(&self, ip: IpAddr) -> String {
        format!("ratelimit:{}:{}", self.scope, ip)
    }

    /// Counts one request from `ip`; `Err` carries the seconds to wait.
    pub async fn check(&self, ip: IpAddr) -> Result<(), u64> {
        match self.store.hit(&self.key(ip), self.window).await {
            Ok(count) if count.hits > self.limit => Err(count.resets_in),
            Ok(_) => Ok(()),
            Err(e) => {
                // Counter backend down: let the request through.
                tracing::warn!(scope = self.scope, error = %e, "Rate limit store unavailable");
                Ok(())
            }
        }
    }
}

/// Client address, preferring the first `x-forwarded-for` hop.
pub fn client_ip(request: &Request) -> Option<IpAddr> {
    let forwarded_ip = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok());

    forwarded_ip.or_else(|| {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    })
}

/// Middleware enforcing a [`RouteRateLimiter`] keyed by client IP.
pub async fn rate_limit_middleware(
    State(limiter): State<RouteRateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(ip) = client_ip(&request) else {
        tracing::warn!(scope = limiter.scope(), "Could not determine IP for rate limiting");
        return Ok(next.run(request).await);
    };

    match limiter.check(ip).await {
        Ok(()) => Ok(next.run(request).await),
        Err(retry_after) => {
            tracing::warn!(scope = limiter.scope(), ip = %ip, "Rate limit exceeded");
            Err(AppError::TooManyRequests(
                "Too many requests. Please try again later.".to_string(),
                Some(retry_after),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, http::StatusCode, middleware::from_fn_with_state, routing::get};
    use tower::ServiceExt;

    fn limited_router(limit: u32) -> Router {
        let limiter = RouteRateLimiter::new(Arc::new(InMemoryCounterStore::new()), "test", limit, 60);
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(from_fn_with_state(limiter, rate_limit_middleware))
    }

    fn request_from(ip: &str) -> Request {
        axum::http::Request::builder()
            .uri("/")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn in_memory_window_counts_hits() {
        let store = InMemoryCounterStore::new();
        let window = Duration::from_secs(60);

        assert_eq!(store.hit("k", window).await.unwrap().hits, 1);
        assert_eq!(store.hit("k", window).await.unwrap().hits, 2);
        assert_eq!(store.hit("other", window).await.unwrap().hits, 1);
    }

    #[tokio::test]
    async fn in_memory_window_resets_after_expiry() {
        let store = InMemoryCounterStore::new();
        let window = Duration::from_millis(20);

        store.hit("k", window).await.unwrap();
        store.hit("k", window).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(store.hit("k", window).await.unwrap().hits, 1);
    }

    #[tokio::test]
    async fn expired_windows_are_swept() {
        let store = InMemoryCounterStore::with_sweep_interval(3);
        let short = Duration::from_millis(20);
        let long = Duration::from_secs(60);

        store.hit("ratelimit:login:10.0.0.1", short).await.unwrap();
        store.hit("ratelimit:login:10.0.0.2", short).await.unwrap();
        assert_eq!(store.len(), 2);
        tokio::time::sleep(Duration::from_millis(30)).await;

        // Third hit triggers the sweep.
        store.hit("ratelimit:global:10.0.0.3", long).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.hit("ratelimit:global:10.0.0.3", long).await.unwrap().hits, 2);
    }

    #[tokio::test]
    async fn rotating_clients_do_not_accumulate() {
        let store = InMemoryCounterStore::with_sweep_interval(10);
        let window = Duration::from_millis(5);

        for i in 0..100u32 {
            let key = format!("ratelimit:login:10.0.{}.{}", i / 256, i % 256);
            store.hit(&key, window).await.unwrap();
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        store.evict_expired(Instant::now());

        assert!(store.is_empty());
    }

    #[test]
    fn redis_window_is_one_transaction_with_expiry() {
        let packed = String::from_utf8_lossy(
            &window_pipeline("ratelimit:login:10.0.0.1", 900).get_packed_pipeline(),
        )
        .into_owned();

        let multi = packed.find("MULTI").expect("MULTI");
        let set = packed.find("SET").expect("SET");
        let incr = packed.find("INCR").expect("INCR");
        let exec = packed.find("EXEC").expect("EXEC");
        assert!(multi < set && set < incr && incr < exec);
        assert!(packed.contains("NX"));
        assert!(packed.contains("900"));
    }

    #[tokio::test]
    async fn rejects_requests_over_the_limit() {
        let app = limited_router(2);

        for _ in 0..2 {
            let res = app.clone().oneshot(request_from("10.0.0.1")).await.unwrap();
            assert_eq!(res.status(), StatusCode::OK);
        }

        let res = app.clone().oneshot(request_from("10.0.0.1")).await.unwrap();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(res.headers().contains_key(axum::http::header::RETRY_AFTER));
    }

    #[tokio::test]
    async fn limits_are_per_client() {
        let app = limited_router(1);

        let first = app.clone().oneshot(request_from("10.0.0.1")).await.unwrap();
        let second = app.clone().oneshot(request_from("10.0.0.2")).await.unwrap();

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::OK);
    }
}
