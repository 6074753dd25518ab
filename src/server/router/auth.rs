use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::{info, instrument};

use super::check_rate;
use crate::auth::{
    clear_session_cookie, extract_token, session_cookie, sign_in, Session, SignInRequest,
};
use crate::errors::{ApiError, ApiResult};
use crate::server::{AppState, RateLimitKind};
use crate::workflow::POLL_INTERVAL_SECS;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/signin", post(signin_handler))
        .route("/api/auth/session", get(session_handler))
        .route("/api/auth/signout", post(signout_handler))
}

#[instrument(name = "snowdash.auth.signin", skip_all)]
async fn signin_handler(
    State(state): State<AppState>,
    client: Option<ConnectInfo<SocketAddr>>,
    Json(request): Json<SignInRequest>,
) -> ApiResult<impl IntoResponse> {
    check_rate(&state, client, RateLimitKind::SignIn)?;
    let (user, credential) = sign_in(state.api.as_ref(), state.oauth.as_ref(), &request).await?;
    let (session, token) = state
        .sessions
        .create(user, credential)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    let cookie = session_cookie(
        &token,
        state.sessions.ttl().num_seconds(),
        state.secure_cookie,
    );
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(json!({
            "user": session.user,
            "token": token,
            "authMode": session.auth_mode(),
            "expiresAt": session.expires_at,
        })),
    ))
}

#[instrument(name = "snowdash.auth.session", skip_all)]
async fn session_handler(
    State(state): State<AppState>,
    Session(session): Session,
) -> impl IntoResponse {
    Json(json!({
        "user": session.user,
        "displayName": session.user.display_name(),
        "authMode": session.auth_mode(),
        "issuedAt": session.issued_at,
        "expiresAt": session.expires_at,
        "instanceUrl": state.instance_url,
        "pollIntervalSecs": POLL_INTERVAL_SECS,
    }))
}

/// Always succeeds; an unknown or missing token just clears the cookie.
#[instrument(name = "snowdash.auth.signout", skip_all)]
async fn signout_handler(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(token) = extract_token(&headers) {
        if state.sessions.revoke(&token).await {
            info!("session revoked");
        }
    }
    (
        [(header::SET_COOKIE, clear_session_cookie())],
        Json(json!({ "success": true })),
    )
}
