//! Request-level errors and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::submission::publisher::PublishError;

/// Body of every error response.
#[derive(Debug, Serialize, Clone)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// Bad JSON, missing multipart boundary or no attachment part.
    #[error("{0}")]
    MalformedRequest(String),
    /// Attachment rejected by size, extension or signature rules.
    #[error("{0}")]
    ValidationFailed(String),
    /// A required credential is missing.
    #[error("{0}")]
    Misconfigured(String),
    #[error("Failed to store attachment: {0}")]
    Storage(#[from] std::io::Error),
    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl SubmitError {
    pub fn status(&self) -> StatusCode {
        match self {
            SubmitError::MalformedRequest(_) | SubmitError::ValidationFailed(_) => {
                StatusCode::BAD_REQUEST
            }
            SubmitError::Misconfigured(_) | SubmitError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            SubmitError::Publish(err) => err.status(),
        }
    }
}

impl IntoResponse for SubmitError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "submission failed");
        } else {
            tracing::info!(status = status.as_u16(), error = %self, "submission rejected");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_kinds_to_status_codes() {
        assert_eq!(
            SubmitError::MalformedRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            SubmitError::ValidationFailed("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            SubmitError::Misconfigured("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        let rejected = PublishError::Rejected {
            status: 422,
            message: "Validation Failed".into(),
        };
        assert_eq!(
            SubmitError::from(rejected).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn upstream_message_is_forwarded() {
        let err = SubmitError::from(PublishError::Rejected {
            status: 401,
            message: "Bad credentials".into(),
        });
        assert_eq!(err.to_string(), "GitHub API error: Bad credentials");
    }
}
