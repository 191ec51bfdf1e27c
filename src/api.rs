// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Inbound HTTP surface: health, status, manual sync, and NetBox webhooks.
//!
//! Requests flow through an explicit pipeline: per-IP rate limiter, then
//! API-key check, then (when a secret is configured) HMAC body signature,
//! then payload parsing, then the handler. Each stage has exactly one
//! failure mode that short-circuits to an HTTP error.
//!
//! Both credential comparisons are constant-time. Mutating endpoints answer
//! `202 Accepted` and hand the work to the sync engine; the gate inside the
//! engine serializes it against everything else.

use crate::context::AppContext;
use crate::metrics;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use subtle::ConstantTimeEq;
use tracing::{error, info, warn};

type HmacSha256 = Hmac<Sha256>;

/// Webhook header carrying the shared API key
const API_KEY_HEADER: &str = "x-netbox-pdns-api-key";

/// Accepted HMAC signature headers, in precedence order
const SIGNATURE_HEADERS: [&str; 2] = ["x-hub-signature-256", "x-signature-256"];

// ============================================================================
// Rate limiting
// ============================================================================

/// A rate class: one counting bucket per source IP per window.
#[derive(Debug)]
pub struct RateClass {
    /// Bucket name, part of the limiter key
    pub name: &'static str,
    /// Requests allowed per window
    pub limit: u32,
    /// Fixed window length
    pub window: Duration,
}

/// `/health`: generous, probes hit it constantly
pub static RATE_HEALTH: RateClass = RateClass {
    name: "health",
    limit: 100,
    window: Duration::from_secs(60),
};

/// `/status` and `/mqtt/status`: monitoring cadence
pub static RATE_STATUS: RateClass = RateClass {
    name: "status",
    limit: 30,
    window: Duration::from_secs(60),
};

/// `/sync`: full syncs are expensive, keep manual triggers rare
pub static RATE_SYNC: RateClass = RateClass {
    name: "sync",
    limit: 5,
    window: Duration::from_secs(60),
};

/// `/zones/*`: webhook bursts from NetBox bulk edits
pub static RATE_ZONES: RateClass = RateClass {
    name: "zones",
    limit: 20,
    window: Duration::from_secs(60),
};

/// Outcome of a rate check, also the source of the `X-RateLimit-*` headers.
#[derive(Debug, Clone, Copy)]
pub struct RateDecision {
    /// The class limit
    pub limit: u32,
    /// Requests left in the current window
    pub remaining: u32,
    /// Seconds until the window resets
    pub reset_secs: u64,
    /// Window length in seconds (for the 429 detail text)
    pub window_secs: u64,
}

struct WindowCounter {
    started: Instant,
    count: u32,
}

/// Fixed-window request counter keyed by `(source IP, class)`.
#[derive(Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<(IpAddr, &'static str), WindowCounter>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a request against its bucket.
    ///
    /// # Errors
    ///
    /// Returns the decision as `Err` when the bucket is exhausted; the
    /// request must be answered with `429`.
    pub fn check(&self, ip: IpAddr, class: &RateClass) -> Result<RateDecision, RateDecision> {
        let mut windows = self.windows.lock().expect("rate limiter lock poisoned");
        let counter = windows
            .entry((ip, class.name))
            .or_insert_with(|| WindowCounter {
                started: Instant::now(),
                count: 0,
            });

        let elapsed = counter.started.elapsed();
        if elapsed >= class.window {
            counter.started = Instant::now();
            counter.count = 0;
        }

        let reset_secs = class
            .window
            .saturating_sub(counter.started.elapsed())
            .as_secs();
        let decision = |count: u32| RateDecision {
            limit: class.limit,
            remaining: class.limit.saturating_sub(count),
            reset_secs,
            window_secs: class.window.as_secs(),
        };

        if counter.count >= class.limit {
            return Err(decision(class.limit));
        }
        counter.count += 1;
        Ok(decision(counter.count))
    }
}

fn humanize_window(secs: u64) -> String {
    match secs {
        60 => "1 minute".to_string(),
        3600 => "1 hour".to_string(),
        _ => format!("{secs} seconds"),
    }
}

// ============================================================================
// Errors
// ============================================================================

/// HTTP-mapped failures of the ingest pipeline.
#[derive(Debug)]
pub enum ApiError {
    /// Missing or mismatching credentials (API key or HMAC signature)
    Unauthorized(&'static str),
    /// Malformed request body
    BadRequest(String),
    /// Rate class exhausted for this source IP
    RateLimited(RateDecision),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized(detail) => {
                (StatusCode::UNAUTHORIZED, Json(json!({ "detail": detail }))).into_response()
            }
            Self::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "detail": detail }))).into_response()
            }
            Self::RateLimited(decision) => {
                let body = Json(json!({
                    "error": "Rate limit exceeded",
                    "detail": format!(
                        "{} per {}",
                        decision.limit,
                        humanize_window(decision.window_secs)
                    ),
                }));
                let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
                apply_rate_headers(response.headers_mut(), decision);
                response
            }
        }
    }
}

fn apply_rate_headers(headers: &mut HeaderMap, decision: RateDecision) {
    let set = |headers: &mut HeaderMap, name: &'static str, value: u64| {
        if let Ok(value) = axum::http::HeaderValue::from_str(&value.to_string()) {
            headers.insert(name, value);
        }
    };
    set(headers, "x-ratelimit-limit", u64::from(decision.limit));
    set(headers, "x-ratelimit-remaining", u64::from(decision.remaining));
    set(headers, "x-ratelimit-reset", decision.reset_secs);
}

// ============================================================================
// Authentication
// ============================================================================

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Check the shared API key header against the configured value.
fn verify_api_key(ctx: &AppContext, headers: &HeaderMap) -> Result<(), ApiError> {
    let provided = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized("Could not validate API key"))?;

    if constant_time_eq(provided, &ctx.config.api_key) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized("Could not validate API key"))
    }
}

/// Verify the HMAC-SHA256 body signature when a webhook secret is set.
///
/// The signature headers carry `sha256=<hex digest>`; the prefix is
/// tolerated but not required. Comparison happens on the hex encodings in
/// constant time.
fn verify_signature(ctx: &AppContext, headers: &HeaderMap, body: &[u8]) -> Result<(), ApiError> {
    let Some(secret) = ctx.config.webhook_secret.as_deref() else {
        return Ok(());
    };

    let provided = SIGNATURE_HEADERS
        .iter()
        .find_map(|name| headers.get(*name))
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized(
            "HMAC signature required when webhook secret is configured",
        ))?;
    let provided = provided.strip_prefix("sha256=").unwrap_or(provided);

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC-SHA256 accepts keys of any length");
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());

    if constant_time_eq(&expected, provided) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized("Invalid webhook signature"))
    }
}

/// Full credential pipeline: API key, then signature.
fn authenticate(ctx: &AppContext, headers: &HeaderMap, body: &[u8]) -> Result<(), ApiError> {
    verify_api_key(ctx, headers)?;
    verify_signature(ctx, headers, body)
}

// ============================================================================
// Payload
// ============================================================================

/// Body of a NetBox zone webhook. Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    /// NetBox zone object id
    pub id: u64,
    /// Zone name, no trailing dot
    pub name: String,
    /// SOA serial, present on some webhook events and unused here
    #[serde(default)]
    pub serial: Option<u64>,
}

fn parse_webhook(body: &[u8]) -> Result<WebhookPayload, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON in request body: {e}")))
}

// ============================================================================
// Middleware
// ============================================================================

#[derive(Clone)]
struct RateState {
    ctx: Arc<AppContext>,
    class: &'static RateClass,
}

fn client_ip(request: &Request) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED), |info| info.0.ip())
}

async fn rate_limit(State(state): State<RateState>, request: Request, next: Next) -> Response {
    let ip = client_ip(&request);
    match state.ctx.rate_limiter.check(ip, state.class) {
        Ok(decision) => {
            let mut response = next.run(request).await;
            apply_rate_headers(response.headers_mut(), decision);
            response
        }
        Err(decision) => {
            warn!(
                %ip,
                class = state.class.name,
                limit = state.class.limit,
                "rate limit exceeded"
            );
            ApiError::RateLimited(decision).into_response()
        }
    }
}

fn rate_state(ctx: &Arc<AppContext>, class: &'static RateClass) -> RateState {
    RateState {
        ctx: ctx.clone(),
        class,
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> Json<Value> {
    Json(json!({ "status": "Healthy" }))
}

async fn status(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    let uptime = ctx.state.uptime_seconds();

    Json(json!({
        "status": ctx.state.health().as_str(),
        "uptime_seconds": (uptime * 100.0).round() / 100.0,
        "initial_sync": {
            "started": ctx.state.initial_sync_started(),
            "completed": ctx.state.initial_sync_completed(),
            "error": ctx.state.initial_sync_error(),
        },
        "scheduler": {
            "running": ctx.state.scheduler_running(),
            "jobs_count": i32::from(ctx.state.scheduler_running()),
        },
        "mqtt": if ctx.config.mqtt.enabled {
            crate::mqtt::status_json(&ctx)
        } else {
            json!({ "enabled": false })
        },
    }))
}

async fn mqtt_status(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    Json(crate::mqtt::status_json(&ctx))
}

async fn metrics_text() -> Response {
    match metrics::gather_metrics() {
        Ok(text) => text.into_response(),
        Err(e) => {
            error!(error = %e, "failed to gather metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "error gathering metrics").into_response()
        }
    }
}

fn queued() -> (StatusCode, Json<Value>) {
    (StatusCode::ACCEPTED, Json(json!({ "status": "queued" })))
}

async fn trigger_full_sync(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    authenticate(&ctx, &headers, &body)?;
    info!("manual full sync requested");

    tokio::spawn(async move {
        if let Err(e) = ctx.engine.sync_all("manual").await {
            error!(error = %e, "manual full sync failed");
        }
    });
    Ok(queued())
}

/// Queue a single-zone reconcile; errors are logged, never resurfaced to
/// the webhook sender.
fn spawn_zone_sync(ctx: Arc<AppContext>, operation: &'static str, zone: String) {
    tokio::spawn(async move {
        match ctx.engine.sync_zone("webhook", operation, &zone).await {
            Ok(outcome) => info!(zone = %zone, operation, ?outcome, "webhook reconcile finished"),
            Err(e) => error!(zone = %zone, operation, error = %e, "webhook reconcile failed"),
        }
    });
}

async fn zone_create(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    authenticate(&ctx, &headers, &body)?;
    let payload = parse_webhook(&body)?;
    info!(zone = %payload.name, id = payload.id, "received zone create webhook");
    spawn_zone_sync(ctx, "webhook_zone_create", payload.name);
    Ok(queued())
}

async fn zone_update(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    authenticate(&ctx, &headers, &body)?;
    let payload = parse_webhook(&body)?;
    info!(zone = %payload.name, id = payload.id, "received zone update webhook");
    spawn_zone_sync(ctx, "webhook_zone_update", payload.name);
    Ok(queued())
}

async fn zone_delete(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    authenticate(&ctx, &headers, &body)?;
    let payload = parse_webhook(&body)?;
    info!(zone = %payload.name, id = payload.id, "received zone delete webhook");
    // The reconciler discovers the zone is gone from the source and walks
    // the delete path itself, which keeps stale delete webhooks harmless.
    spawn_zone_sync(ctx, "webhook_zone_delete", payload.name);
    Ok(queued())
}

// ============================================================================
// Router
// ============================================================================

/// Build the full application router.
#[must_use]
pub fn router(ctx: Arc<AppContext>) -> Router {
    let health_routes = Router::new()
        .route("/health", get(health))
        .route_layer(middleware::from_fn_with_state(
            rate_state(&ctx, &RATE_HEALTH),
            rate_limit,
        ));

    let status_routes = Router::new()
        .route("/status", get(status))
        .route("/mqtt/status", get(mqtt_status))
        .route_layer(middleware::from_fn_with_state(
            rate_state(&ctx, &RATE_STATUS),
            rate_limit,
        ));

    let sync_routes = Router::new()
        .route("/sync", post(trigger_full_sync))
        .route_layer(middleware::from_fn_with_state(
            rate_state(&ctx, &RATE_SYNC),
            rate_limit,
        ));

    let zone_routes = Router::new()
        .route("/zones/create", post(zone_create))
        .route("/zones/update", post(zone_update))
        .route("/zones/delete", post(zone_delete))
        .route_layer(middleware::from_fn_with_state(
            rate_state(&ctx, &RATE_ZONES),
            rate_limit,
        ));

    Router::new()
        .merge(health_routes)
        .merge(status_routes)
        .merge(sync_routes)
        .merge(zone_routes)
        .route("/metrics", get(metrics_text))
        .with_state(ctx)
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod api_tests;
