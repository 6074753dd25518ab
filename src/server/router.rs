use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};

mod auth;
mod dashboards;
mod itom;
mod ritms;
mod tables;
mod widgets;

use super::rate_limit::RateLimitKind;
use super::state::AppState;
use crate::errors::ApiError;

/// Full HTTP surface: health probes plus every `/api` module.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/livez", get(live_handler))
        .route("/readyz", get(ready_handler))
        .merge(auth::router())
        .merge(ritms::router())
        .merge(dashboards::router())
        .merge(itom::router())
        .merge(widgets::router())
        .merge(tables::router())
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
}

/// Rejects with 429 when the caller's bucket for `kind` is empty. Callers
/// without connection info share one bucket.
pub(crate) fn check_rate(
    state: &AppState,
    client: Option<ConnectInfo<SocketAddr>>,
    kind: RateLimitKind,
) -> Result<(), ApiError> {
    let key = client
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    if state.rate_limiter.allow(&key, kind) {
        Ok(())
    } else {
        Err(ApiError::TooManyRequests)
    }
}

async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.health.snapshot();
    Json(json!({
        "status": "ok",
        "ready": snapshot.ready,
        "live": snapshot.live,
        "instance_url": state.instance_url,
        "oauth_enabled": state.oauth.is_some(),
        "last_ready_check_ts": snapshot.last_ready_check,
        "last_error": snapshot.last_error,
    }))
}

async fn live_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.health.snapshot();
    let status = if snapshot.live {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({ "live": snapshot.live, "ready": snapshot.ready })),
    )
}

async fn ready_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.health.snapshot();
    let status = if snapshot.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "ready": snapshot.ready,
            "last_ready_check_ts": snapshot.last_ready_check,
            "last_error": snapshot.last_error,
        })),
    )
}
