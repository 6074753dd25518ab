use axum::extract::{Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, instrument};

use crate::auth::Session;
use crate::dashboard::{
    create_platform_dashboard, delete_platform_dashboard, delete_preference,
    list_platform_dashboards, load_preference, save_preference, DashboardDocument,
};
use crate::errors::{ApiError, ApiResult};
use crate::server::AppState;
use crate::servicenow::NowError;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/servicenow/dashboards",
            get(load_handler).post(save_handler).delete(delete_handler),
        )
        .route("/api/servicenow/dashboards/list", get(platform_list_handler))
        .route(
            "/api/servicenow/dashboards/create",
            post(platform_create_handler),
        )
        .route(
            "/api/servicenow/dashboards/delete",
            delete(platform_delete_handler),
        )
}

#[instrument(name = "snowdash.dashboards.load", skip_all)]
async fn load_handler(
    State(state): State<AppState>,
    Session(session): Session,
) -> ApiResult<Json<Value>> {
    let stored = load_preference(state.api.as_ref(), &session.credential, &session.user.sys_id)
        .await
        .map_err(ApiError::upstream("Failed to load dashboards"))?;
    Ok(Json(json!({
        "success": true,
        "data": stored.document,
        "preferenceId": stored.preference_id,
    })))
}

/// Accepts `{document, preferenceId?}` or the older flat
/// `{dashboards, widgets, snFavorites, preferenceId?}` body.
#[instrument(name = "snowdash.dashboards.save", skip_all)]
async fn save_handler(
    State(state): State<AppState>,
    Session(session): Session,
    Json(mut body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let preference_id = body
        .get("preferenceId")
        .and_then(Value::as_str)
        .map(str::to_string);
    let document = body.get_mut("document").map(Value::take);
    let raw = document.unwrap_or(body);
    if !raw.is_object() {
        return Err(ApiError::bad_request("Dashboard document is required"));
    }
    let incoming = DashboardDocument::from_value(raw)
        .map_err(|err| ApiError::bad_request(format!("Invalid dashboard document: {err}")))?;

    let saved = save_preference(
        state.api.as_ref(),
        &session.credential,
        &session.user.sys_id,
        preference_id.as_deref(),
        incoming,
        Utc::now(),
    )
    .await
    .map_err(ApiError::upstream("Failed to save dashboards"))?;
    info!(revision = saved.document.revision, "dashboards saved to preference");
    Ok(Json(json!({
        "success": true,
        "message": "Dashboards saved to ServiceNow",
        "preferenceId": saved.preference_id,
        "data": saved.document,
    })))
}

#[derive(Debug, Deserialize)]
struct PreferenceParams {
    #[serde(rename = "preferenceId")]
    preference_id: Option<String>,
}

#[instrument(name = "snowdash.dashboards.delete", skip(state, session))]
async fn delete_handler(
    State(state): State<AppState>,
    Session(session): Session,
    Query(params): Query<PreferenceParams>,
) -> ApiResult<Json<Value>> {
    let preference_id = params
        .preference_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Preference ID required"))?;
    delete_preference(state.api.as_ref(), &session.credential, &preference_id)
        .await
        .map_err(ApiError::upstream("Failed to delete preference"))?;
    Ok(Json(json!({
        "success": true,
        "message": "Dashboard preference deleted",
    })))
}

#[instrument(name = "snowdash.dashboards.platform_list", skip_all)]
async fn platform_list_handler(
    State(state): State<AppState>,
    Session(session): Session,
) -> ApiResult<Json<Value>> {
    let dashboards = list_platform_dashboards(state.api.as_ref(), &session.credential)
        .await
        .map_err(ApiError::upstream("Failed to list dashboards"))?;
    Ok(Json(json!({
        "success": true,
        "total": dashboards.len(),
        "dashboards": dashboards,
        "source": "par_dashboard",
        "instanceUrl": state.instance_url,
    })))
}

#[derive(Debug, Deserialize)]
struct CreateRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[instrument(name = "snowdash.dashboards.platform_create", skip_all)]
async fn platform_create_handler(
    State(state): State<AppState>,
    Session(session): Session,
    Json(request): Json<CreateRequest>,
) -> ApiResult<Json<Value>> {
    let name = request
        .name
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Dashboard name is required"))?;
    let dashboard = create_platform_dashboard(
        state.api.as_ref(),
        &session.credential,
        &name,
        request.description.as_deref(),
    )
    .await
    .map_err(|err| match err.status() {
        Some(403) => ApiError::Forbidden(
            "Permission denied. You may not have access to create dashboards.".into(),
        ),
        _ => ApiError::upstream("Failed to create dashboard")(err),
    })?;
    Ok(Json(json!({
        "success": true,
        "dashboard": {
            "sys_id": dashboard.sys_id,
            "name": dashboard.name,
            "description": dashboard.description,
        },
    })))
}

#[derive(Debug, Deserialize)]
struct DeleteParams {
    sys_id: Option<String>,
}

#[instrument(name = "snowdash.dashboards.platform_delete", skip(state, session))]
async fn platform_delete_handler(
    State(state): State<AppState>,
    Session(session): Session,
    Query(params): Query<DeleteParams>,
) -> ApiResult<Json<Value>> {
    let sys_id = params
        .sys_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Dashboard sys_id is required"))?;
    delete_platform_dashboard(state.api.as_ref(), &session.credential, &sys_id)
        .await
        .map_err(platform_delete_error)?;
    Ok(Json(json!({
        "success": true,
        "message": "Dashboard deleted successfully",
    })))
}

fn platform_delete_error(err: NowError) -> ApiError {
    match err.status() {
        Some(403) => ApiError::Forbidden(
            "Permission denied. You may not have access to delete this dashboard.".into(),
        ),
        Some(404) => ApiError::not_found("Dashboard not found"),
        _ => ApiError::upstream("Failed to delete dashboard")(err),
    }
}
