use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use tracing::instrument;

use crate::auth::Session;
use crate::errors::{ApiError, ApiResult};
use crate::itom::{mid_servers, summary, ItomSummary, MidServers};
use crate::server::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/api/servicenow/mid-servers", get(mid_servers_handler))
        .route("/api/servicenow/itom", get(summary_handler))
}

#[derive(Debug, Deserialize)]
struct MidServerParams {
    host_ip: Option<String>,
    name: Option<String>,
}

#[instrument(name = "snowdash.itom.mid_servers_route", skip(state, session))]
async fn mid_servers_handler(
    State(state): State<AppState>,
    Session(session): Session,
    Query(params): Query<MidServerParams>,
) -> ApiResult<Json<MidServers>> {
    let servers = mid_servers(
        state.api.as_ref(),
        &session.credential,
        params.host_ip.as_deref(),
        params.name.as_deref(),
    )
    .await
    .map_err(ApiError::upstream("Failed to fetch MID servers"))?;
    Ok(Json(servers))
}

/// Never fails once authenticated; missing tables read as zero.
#[instrument(name = "snowdash.itom.summary_route", skip_all)]
async fn summary_handler(
    State(state): State<AppState>,
    Session(session): Session,
) -> Json<ItomSummary> {
    Json(
        summary(
            state.api.as_ref(),
            &session.credential,
            &state.instance_url,
            Utc::now(),
        )
        .await,
    )
}
