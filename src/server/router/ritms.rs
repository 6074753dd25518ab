use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, instrument};

use super::check_rate;
use crate::auth::Session;
use crate::errors::{ApiError, ApiResult};
use crate::server::{AppState, RateLimitKind};
use crate::servicenow::{ensure_identifier, Credential, DisplayValue, NowApi, Record, TableQuery};
use crate::workflow::{
    allowed_patch, format_now_date, Board, BoardFilter, EmailNumber, Reminder, StatusFilter,
    LAST_EMAIL_FIELD, RITM_FIELDS, RITM_TABLE, STATUS_FIELD,
};

const BOARD_FIELDS: &str = "sys_id,number,cat_item,short_description,state,requested_for,sys_created_on,u_discovery_status,u_last_email_date,u_host_ip,u_network_type,u_notes";

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/api/ritms", get(list_handler))
        .route("/api/ritms/board", get(board_handler))
        .route("/api/ritms/:sys_id", patch(patch_handler))
        .route("/api/ritms/:sys_id/send-email", post(send_email_handler))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<u32>,
    offset: Option<u32>,
    query: Option<String>,
    fields: Option<String>,
}

#[instrument(name = "snowdash.ritms.list", skip(state, session))]
async fn list_handler(
    State(state): State<AppState>,
    Session(session): Session,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Value>> {
    let limit = params.limit.unwrap_or(50);
    let offset = params.offset.unwrap_or(0);
    let fields = params
        .fields
        .filter(|fields| !fields.trim().is_empty())
        .unwrap_or_else(|| RITM_FIELDS.to_string());
    let query = TableQuery::new()
        .limit(limit)
        .offset(offset)
        .query(params.query.unwrap_or_default())
        .fields(fields);
    let page = state
        .api
        .list_with_count(&session.credential, RITM_TABLE, &query)
        .await
        .map_err(ApiError::upstream("Failed to fetch RITMs"))?;
    Ok(Json(json!({
        "total": page.count_or_len(),
        "ritms": page.records,
        "limit": limit,
        "offset": offset,
        "instanceUrl": state.instance_url,
    })))
}

#[instrument(name = "snowdash.ritms.patch", skip(state, session, body))]
async fn patch_handler(
    State(state): State<AppState>,
    Session(session): Session,
    Path(sys_id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Record>> {
    checked_sys_id(&sys_id)?;
    let updates = allowed_patch(&body)
        .ok_or_else(|| ApiError::bad_request("No valid fields to update"))?;
    let fields: Vec<&str> = updates.keys().map(String::as_str).collect();
    info!(?fields, "updating RITM workflow fields");
    let record = state
        .api
        .update(
            &session.credential,
            RITM_TABLE,
            &sys_id,
            &Value::Object(updates),
        )
        .await
        .map_err(ApiError::upstream("Failed to update RITM"))?;
    Ok(Json(record))
}

/// The sys_id lands in an encoded query and in the outbound email, so it is
/// checked before any upstream call.
fn checked_sys_id(sys_id: &str) -> Result<(), ApiError> {
    ensure_identifier(sys_id).map_err(|_| ApiError::bad_request("Invalid RITM sys_id"))
}

/// Name and email of the RITM's `requested_for` user, blank when unknown.
async fn requester_of(
    api: &dyn NowApi,
    cred: &Credential,
    ritm: &Record,
) -> Result<(String, String), ApiError> {
    let Some(user_id) = ritm.field("requested_for").reference_id() else {
        return Ok((String::new(), String::new()));
    };
    let query = TableQuery::new()
        .query(format!("sys_id={user_id}"))
        .fields("email,name")
        .limit(1);
    let user = api
        .list(cred, "sys_user", &query)
        .await
        .map_err(ApiError::upstream("Failed to send email"))?
        .into_iter()
        .next();
    Ok(user
        .map(|user| (user.display("name"), user.display("email")))
        .unwrap_or_default())
}

/// Validation and lookups all happen before anything is sent; the status
/// patch follows a successful send.
#[instrument(name = "snowdash.ritms.send_email", skip(state, session, client, body))]
async fn send_email_handler(
    State(state): State<AppState>,
    Session(session): Session,
    Path(sys_id): Path<String>,
    client: Option<ConnectInfo<SocketAddr>>,
    body: Option<Json<Value>>,
) -> ApiResult<Json<Value>> {
    let body = body.map(|Json(value)| value).unwrap_or(Value::Null);
    let number = EmailNumber::from_json(body.get("emailNum"))?;
    checked_sys_id(&sys_id)?;
    check_rate(&state, client, RateLimitKind::Email)?;

    let cred = &session.credential;
    let query = TableQuery::new()
        .query(format!("sys_id={sys_id}"))
        .fields("sys_id,number,short_description,requested_for")
        .limit(1);
    let ritm = state
        .api
        .list(cred, RITM_TABLE, &query)
        .await
        .map_err(ApiError::upstream("Failed to send email"))?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::not_found("RITM not found"))?;

    let (requester_name, requester_email) = requester_of(state.api.as_ref(), cred, &ritm).await?;
    let reminder = Reminder::new(
        &sys_id,
        &ritm.display("number"),
        &ritm.display("short_description"),
        &requester_name,
        &requester_email,
    )?;

    let email_id = state
        .api
        .send_email(cred, &reminder.message(number))
        .await
        .map_err(ApiError::upstream("Failed to send email"))?;
    info!(email = number.as_u8(), email_id = ?email_id, "discovery email queued");

    let status_patch = json!({
        STATUS_FIELD: number.status_after_send(),
        LAST_EMAIL_FIELD: format_now_date(Utc::now()),
    });
    state
        .api
        .update(cred, RITM_TABLE, &sys_id, &status_patch)
        .await
        .map_err(ApiError::upstream("Failed to send email"))?;

    Ok(Json(json!({
        "success": true,
        "message": format!(
            "Email {} sent to {}. Check ServiceNow: System > Email > Outbound.",
            number.as_u8(),
            reminder.requester_email
        ),
    })))
}

#[derive(Debug, Deserialize)]
struct BoardParams {
    search: Option<String>,
    status: Option<String>,
    demo: Option<bool>,
    limit: Option<u32>,
}

#[instrument(name = "snowdash.ritms.board", skip(state, session))]
async fn board_handler(
    State(state): State<AppState>,
    Session(session): Session,
    Query(params): Query<BoardParams>,
) -> ApiResult<Json<Board>> {
    let status: StatusFilter = params
        .status
        .as_deref()
        .unwrap_or_default()
        .parse()
        .map_err(|_| ApiError::bad_request("Unknown status filter"))?;
    let query = TableQuery::new()
        .limit(params.limit.unwrap_or(100))
        .fields(BOARD_FIELDS)
        .display_value(DisplayValue::All);
    let records = state
        .api
        .list(&session.credential, RITM_TABLE, &query)
        .await
        .map_err(ApiError::upstream("Failed to fetch RITMs"))?;
    let filter = BoardFilter {
        search: params.search.unwrap_or_default(),
        status,
    };
    Ok(Json(Board::build(
        &records,
        &filter,
        Utc::now(),
        params.demo.unwrap_or(false),
        Some(state.instance_url.as_str()),
    )))
}
