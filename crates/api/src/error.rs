use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use common::Error;

/// Error response for control API handlers. Carries the error kind and the
/// message verbatim so exchange diagnostics reach the operator unchanged.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Core(Error),
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError::Core(e)
    }
}

fn kind(e: &Error) -> &'static str {
    match e {
        Error::Connectivity(_) => "connectivity",
        Error::Authentication(_) => "authentication",
        Error::Policy(_) => "policy",
        Error::Order(_) => "order",
        Error::Internal(_) => "internal",
        Error::Config(_) => "config",
        Error::InvalidState(_) => "invalid_state",
    }
}

fn status_for(e: &Error) -> StatusCode {
    match e {
        Error::Connectivity(_) => StatusCode::BAD_GATEWAY,
        Error::Authentication(_) => StatusCode::FORBIDDEN,
        Error::Policy(_) | Error::Order(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::InvalidState(_) => StatusCode::CONFLICT,
        Error::Internal(_) | Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Core(e) => (status_for(&e), kind(&e), e.to_string()),
        };
        (
            status,
            Json(json!({ "ok": false, "kind": kind, "error": message })),
        )
            .into_response()
    }
}
