use crate::errors::HttpError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub(super) enum WebError {
    #[error("HTTP error: {0}")]
    Http(HttpError),
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        match self {
            WebError::Http(err) => match err {
                HttpError::Unauthorized { details } => (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"error": "unauthorized", "message": details})),
                )
                    .into_response(),
                HttpError::Forbidden { details } => (
                    StatusCode::FORBIDDEN,
                    Json(json!({"error": "forbidden", "message": details})),
                )
                    .into_response(),
                HttpError::RequestValidation { details } => (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": "invalid_request", "message": details})),
                )
                    .into_response(),
                HttpError::NotConfigured { hint } => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({"error": "not_configured", "hint": hint})),
                )
                    .into_response(),
                HttpError::RateLimited { details } => (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({"error": "rate_limited", "message": details})),
                )
                    .into_response(),
                HttpError::Unhandled { details } => {
                    tracing::error!(details = ?details, "Unhandled error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({"error": "internal"})),
                    )
                        .into_response()
                }
            },
        }
    }
}
