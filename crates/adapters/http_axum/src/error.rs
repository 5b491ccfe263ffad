//! HTTP error response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use remoteswitch_domain::error::{SwitchError, ValidationError};

/// JSON error body returned by API endpoints.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Maps [`SwitchError`] to an HTTP response with appropriate status code.
#[derive(Debug)]
pub struct ApiError(SwitchError);

impl From<SwitchError> for ApiError {
    fn from(err: SwitchError) -> Self {
        Self(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self(err.into())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            SwitchError::Validation(_) => StatusCode::BAD_REQUEST,
            SwitchError::NotFound(_) => StatusCode::NOT_FOUND,
            SwitchError::Conflict(_) | SwitchError::DuplicateName(_) => StatusCode::CONFLICT,
            SwitchError::UnknownCombination(_) => StatusCode::UNPROCESSABLE_ENTITY,
            SwitchError::Transport(_) => StatusCode::BAD_GATEWAY,
            SwitchError::Init(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self.0, "switch request failed");
        }
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}
