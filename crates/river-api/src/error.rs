use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

use river_core::CoreError;

/// Standardized API error response payload.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorObject,
}

#[derive(Serialize)]
struct ErrorObject {
    code: &'static str,
    message: String,
}

pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = match &self.0 {
            CoreError::QuotaExceeded => (StatusCode::FORBIDDEN, "QUOTA_EXCEEDED"),
            CoreError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_FAILED"),
            CoreError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            CoreError::InvalidToken => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN"),
            CoreError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            CoreError::RiverFull => (StatusCode::CONFLICT, "RIVER_FULL"),
            CoreError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };
        let message = match &self.0 {
            // Backend details stay out of responses.
            CoreError::Store(e) => {
                tracing::error!(error = %e, "storage failure");
                "An internal error occurred.".to_string()
            }
            other => other.to_string(),
        };
        (
            status,
            Json(ErrorBody {
                error: ErrorObject { code, message },
            }),
        )
            .into_response()
    }
}
