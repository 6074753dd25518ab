use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::instrument;

use crate::auth::Session;
use crate::errors::ApiResult;
use crate::server::AppState;
use crate::widgets::{load_widget_data, sources, WidgetData, WidgetDataParams, WidgetSpec};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/api/widgets/data", get(data_handler))
        .route("/api/widgets/sources", get(sources_handler))
}

#[instrument(name = "snowdash.widgets.data", skip(state, session))]
async fn data_handler(
    State(state): State<AppState>,
    Session(session): Session,
    Query(params): Query<WidgetDataParams>,
) -> ApiResult<Json<WidgetData>> {
    let spec = WidgetSpec::from_params(params)?;
    let data = load_widget_data(state.api.as_ref(), &session.credential, &spec).await?;
    Ok(Json(data))
}

#[instrument(name = "snowdash.widgets.sources", skip_all)]
async fn sources_handler(Session(_session): Session) -> Json<Value> {
    Json(json!({ "sources": sources() }))
}
