//! API error handling with structured JSON responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::users::services::UserError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Conflict(_) => "CONFLICT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<UserError> for ApiError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::NotFound(msg) => Self::NotFound(msg),
            UserError::Duplicate(msg) => Self::Conflict(msg),
            // A unique-index violation here means a concurrent writer won the
            // race between the service's existence check and the insert.
            UserError::Store(e) => match e.downcast_ref::<sqlx::Error>() {
                Some(sqlx::Error::Database(db))
                    if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation) =>
                {
                    Self::Conflict(db.message().to_string())
                }
                _ => Self::Internal(e.to_string()),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            Self::NotFound(m) | Self::BadRequest(m) | Self::Conflict(m) | Self::Internal(m) => {
                m.clone()
            }
        };

        if status.is_server_error() {
            error!(%status, %message, "request failed");
        } else {
            warn!(%status, %message, "request rejected");
        }

        let body = Json(ErrorBody {
            error: ErrorDetail {
                code: self.error_code(),
                message,
                status: status.as_u16(),
            },
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_errors_map_to_expected_statuses() {
        let not_found = ApiError::from(UserError::NotFound("User not found with id: 7".into()));
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);

        let duplicate = ApiError::from(UserError::Duplicate("Username already exists".into()));
        assert_eq!(duplicate.status_code(), StatusCode::CONFLICT);

        let store = ApiError::from(UserError::Store(anyhow::anyhow!("connection reset")));
        assert_eq!(store.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn error_body_is_structured() {
        let err = ApiError::Conflict("Email already exists".into());
        assert_eq!(err.error_code(), "CONFLICT");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
