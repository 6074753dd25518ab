//! HTTP-facing error type.
//!
//! Each layer keeps its own `thiserror` enum; handlers convert into
//! [`ApiError`], which renders `{"error": ..., "details"?: ...}` bodies.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::auth::SignInError;
use crate::dashboard::DashboardError;
use crate::servicenow::NowError;
use crate::widgets::WidgetError;
use crate::workflow::WorkflowError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,
    /// Sign-in rejected with a specific reason.
    #[error("{0}")]
    AuthFailed(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("Too many requests")]
    TooManyRequests,
    #[error("{context}")]
    Upstream {
        context: String,
        #[source]
        source: NowError,
    },
    #[error("{0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    /// Wraps an upstream failure under a user-facing context message.
    /// Meant for `map_err(ApiError::upstream("Failed to fetch RITMs"))`.
    pub fn upstream(context: &'static str) -> impl FnOnce(NowError) -> ApiError {
        move |source| ApiError::Upstream {
            context: context.to_string(),
            source,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized | ApiError::AuthFailed(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream {
                source: NowError::InvalidIdentifier(_),
                ..
            } => StatusCode::BAD_REQUEST,
            ApiError::Upstream { .. } | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            ApiError::Upstream { source, .. } => Some(source.upstream_message()),
            _ => None,
        }
    }
}

impl From<SignInError> for ApiError {
    fn from(err: SignInError) -> Self {
        match err {
            SignInError::InvalidCredentials => ApiError::AuthFailed(err.to_string()),
            SignInError::MissingCredentials | SignInError::OAuthUnavailable => {
                ApiError::BadRequest(err.to_string())
            }
        }
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<DashboardError> for ApiError {
    fn from(err: DashboardError) -> Self {
        match err {
            DashboardError::NotFound(_) | DashboardError::WidgetNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            DashboardError::DefaultUndeletable | DashboardError::BlankName => {
                ApiError::BadRequest(err.to_string())
            }
            DashboardError::Io(_) | DashboardError::Parse(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<WidgetError> for ApiError {
    fn from(err: WidgetError) -> Self {
        match err {
            WidgetError::Upstream(source) => ApiError::Upstream {
                context: "Failed to fetch widget data".to_string(),
                source,
            },
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Upstream { context, source } => {
                error!(%context, error = %source, "upstream request failed")
            }
            ApiError::Internal(message) => error!(%message, "internal error"),
            _ if status.is_client_error() => warn!(status = status.as_u16(), error = %self, "request rejected"),
            _ => {}
        }
        let body = match self.details() {
            Some(details) => json!({ "error": self.to_string(), "details": details }),
            None => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
