use axum::{http::StatusCode, response::IntoResponse, Json};

use super::types::ApiError;

/// Service-level failure taxonomy. Raw storage errors never reach the
/// caller; services translate them before handlers see them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ApiFailure {
    Unauthenticated,
    InvalidRequest,
    Forbidden,
    NotFound,
    Conflict,
    /// The channel row was deleted but the message cascade failed.
    CascadeIncomplete,
    Internal,
}

impl std::fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> axum::response::Response {
        match self {
            Self::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                Json(ApiError {
                    error: "unauthenticated",
                }),
            )
                .into_response(),
            Self::InvalidRequest => (
                StatusCode::BAD_REQUEST,
                Json(ApiError {
                    error: "invalid_request",
                }),
            )
                .into_response(),
            Self::Forbidden => (
                StatusCode::FORBIDDEN,
                Json(ApiError { error: "forbidden" }),
            )
                .into_response(),
            Self::NotFound => (
                StatusCode::NOT_FOUND,
                Json(ApiError { error: "not_found" }),
            )
                .into_response(),
            Self::Conflict => (
                StatusCode::CONFLICT,
                Json(ApiError { error: "conflict" }),
            )
                .into_response(),
            Self::CascadeIncomplete => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError {
                    error: "cascade_incomplete",
                }),
            )
                .into_response(),
            Self::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError {
                    error: "internal_error",
                }),
            )
                .into_response(),
        }
    }
}

pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_current_span(true)
        .with_span_list(true)
        .init();
}
