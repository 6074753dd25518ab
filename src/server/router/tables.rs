use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::auth::Session;
use crate::errors::{ApiError, ApiResult};
use crate::server::AppState;
use crate::servicenow::TableQuery;
use crate::workflow::{RITM_FIELDS, RITM_TABLE};

const USER_FIELDS: &str = "sys_id,user_name,first_name,last_name,email,active";

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/api/servicenow/request-items", get(request_items_handler))
        .route("/api/servicenow/users", get(users_handler))
        .route("/api/servicenow/:table", get(table_handler))
}

#[derive(Debug, Deserialize)]
struct TableParams {
    limit: Option<u32>,
    query: Option<String>,
}

/// Generic read used by every widget. The table name is validated by the
/// client before any request goes out.
#[instrument(name = "snowdash.tables.read", skip(state, session))]
async fn table_handler(
    State(state): State<AppState>,
    Session(session): Session,
    Path(table): Path<String>,
    Query(params): Query<TableParams>,
) -> ApiResult<Json<Value>> {
    let query = TableQuery::new()
        .limit(params.limit.unwrap_or(50))
        .query(params.query.unwrap_or_default());
    let records = state
        .api
        .list(&session.credential, &table, &query)
        .await
        .map_err(ApiError::upstream("Failed to fetch data"))?;
    debug!(count = records.len(), "table rows fetched");
    Ok(Json(json!({
        "total": records.len(),
        "data": records,
        "table": table,
    })))
}

#[derive(Debug, Deserialize)]
struct PassThroughParams {
    limit: Option<u32>,
    offset: Option<u32>,
    query: Option<String>,
    fields: Option<String>,
}

impl PassThroughParams {
    fn into_query(self, default_fields: &str) -> TableQuery {
        TableQuery::new()
            .limit(self.limit.unwrap_or(10))
            .offset(self.offset.unwrap_or(0))
            .query(self.query.unwrap_or_default())
            .fields(
                self.fields
                    .filter(|fields| !fields.trim().is_empty())
                    .unwrap_or_else(|| default_fields.to_string()),
            )
    }
}

#[instrument(name = "snowdash.tables.request_items", skip(state, session))]
async fn request_items_handler(
    State(state): State<AppState>,
    Session(session): Session,
    Query(params): Query<PassThroughParams>,
) -> ApiResult<Json<Value>> {
    let records = state
        .api
        .list(
            &session.credential,
            RITM_TABLE,
            &params.into_query(RITM_FIELDS),
        )
        .await
        .map_err(ApiError::upstream("Failed to fetch request items"))?;
    Ok(Json(json!({
        "requestItems": records,
        "instanceUrl": state.instance_url,
    })))
}

#[instrument(name = "snowdash.tables.users", skip(state, session))]
async fn users_handler(
    State(state): State<AppState>,
    Session(session): Session,
    Query(params): Query<PassThroughParams>,
) -> ApiResult<Json<Value>> {
    let records = state
        .api
        .list(
            &session.credential,
            "sys_user",
            &params.into_query(USER_FIELDS),
        )
        .await
        .map_err(ApiError::upstream("Failed to fetch users"))?;
    Ok(Json(json!({ "users": records })))
}
