//! API key check and per-client request limiting for the HTTP API.

use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::config::SecurityConfig;

/// Tracked clients before expired windows are swept.
const SWEEP_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window request counter keyed by client address.
#[derive(Clone, Debug)]
pub struct RequestLimiter {
    max_requests: u32,
    window: Duration,
    clients: Arc<Mutex<HashMap<IpAddr, Window>>>,
}

impl RequestLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }

    /// Count a request from `client` at `now`. Returns false once the client
    /// has used up its window.
    pub fn allow(&self, client: IpAddr, now: Instant) -> bool {
        let mut clients = self.clients.lock().expect("request limiter lock poisoned");

        if clients.len() > SWEEP_THRESHOLD {
            let window = self.window;
            clients.retain(|_, w| now.duration_since(w.started) < window);
        }

        let entry = clients.entry(client).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        if entry.count < self.max_requests {
            entry.count += 1;
            true
        } else {
            false
        }
    }

    pub fn tracked_clients(&self) -> usize {
        self.clients
            .lock()
            .expect("request limiter lock poisoned")
            .len()
    }
}

/// Reject requests without the configured API key. `/health` stays open.
pub async fn require_api_key(
    State(config): State<SecurityConfig>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    let Some(expected) = config.api_key.as_deref() else {
        return Ok(next.run(request).await);
    };
    if request.uri().path().ends_with("/health") {
        return Ok(next.run(request).await);
    }

    match presented_key(request.headers()) {
        Some(key) if key == expected => Ok(next.run(request).await),
        Some(_) => {
            tracing::warn!(path = %request.uri().path(), "Rejected request with wrong API key");
            Err((StatusCode::UNAUTHORIZED, "Invalid API key"))
        }
        None => {
            tracing::warn!(path = %request.uri().path(), "Rejected request without API key");
            Err((StatusCode::UNAUTHORIZED, "Missing API key"))
        }
    }
}

pub async fn limit_requests(
    State(limiter): State<RequestLimiter>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    let client = client_ip(&request);

    if limiter.allow(client, Instant::now()) {
        Ok(next.run(request).await)
    } else {
        tracing::warn!(%client, "Request limit exceeded");
        Err((StatusCode::TOO_MANY_REQUESTS, "Too many requests"))
    }
}

/// `Authorization: Bearer <key>` or `X-Api-Key: <key>`.
fn presented_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(value) = headers.get("Authorization").and_then(|h| h.to_str().ok()) {
        return value.strip_prefix("Bearer ").map(str::trim);
    }
    headers
        .get("X-Api-Key")
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
}

/// First `X-Forwarded-For` hop, then the peer address, then loopback.
fn client_ip(request: &Request<Body>) -> IpAddr {
    let forwarded = request
        .headers()
        .get("X-Forwarded-For")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|ip| ip.trim().parse().ok());
    if let Some(ip) = forwarded {
        return ip;
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}
