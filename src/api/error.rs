//! JSON error envelope for the `/api` endpoints.
//!
//! Every error is answered as `{ "error": { "code", "message", "details"? } }`
//! with a status code derived from the error code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, BackendError, FieldErrors};
use crate::loan::FormError;

/// Error codes for API responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Client errors (4xx)
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    ValidationError,

    // Server errors (5xx)
    InternalError,
    DatabaseError,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Conflict => "conflict",
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::InternalError => "internal_error",
            ErrorCode::DatabaseError => "database_error",
        }
    }
}

/// The inner error object in the response
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    /// Field-level validation messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<FieldErrors>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug)]
pub struct ApiError {
    code: ErrorCode,
    status: StatusCode,
    message: String,
    details: Option<FieldErrors>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: code.status_code(),
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Unauthorized error (401) - authentication required
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    /// Forbidden error (403) - authenticated but not allowed
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    /// Validation error (400) with field-level details
    pub fn validation(errors: FieldErrors) -> Self {
        let mut err = Self::new(ErrorCode::ValidationError, errors.summary());
        err.details = Some(errors);
        err
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let response = ErrorResponse {
            error: ErrorBody {
                code: self.code.as_str().to_string(),
                message: self.message,
                details: self.details,
            },
        };

        (self.status, Json(response)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<BackendError> for ApiError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotFound => ApiError::not_found("Resource not found"),
            BackendError::InvalidCredentials => ApiError::unauthorized(err.to_string()),
            BackendError::Rejected(message) => ApiError::conflict(message),
            BackendError::Hashing(_) => {
                tracing::error!(error = %err, "Hashing error");
                ApiError::internal("An internal error occurred")
            }
            BackendError::Database(ref db_err) => {
                tracing::error!(error = %db_err, "Database error");
                ApiError::database("A database error occurred")
            }
        }
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::AuthenticationRequired => ApiError::unauthorized("Authentication required"),
            AppError::AuthorizationDenied => ApiError::forbidden("Access Denied"),
            AppError::NotFound(what) => ApiError::not_found(format!("{} not found", what)),
            AppError::Backend(err) => err.into(),
            AppError::Validation(errors) => ApiError::validation(errors),
        }
    }
}

impl From<FormError> for ApiError {
    fn from(err: FormError) -> Self {
        AppError::from(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_status_codes() {
        assert_eq!(ErrorCode::ValidationError.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::InternalError.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_validation_carries_field_details() {
        let mut errors = FieldErrors::new();
        errors.add("term", "Must be between 1 and 360");
        errors.add("ltv", "Must be between 0 and 100");

        let err = ApiError::validation(errors);
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert!(err.message.contains("2 fields"));
        let json = serde_json::to_value(ErrorBody {
            code: err.code.as_str().to_string(),
            message: err.message.clone(),
            details: err.details.clone(),
        })
        .unwrap();
        assert_eq!(json["details"]["term"][0], "Must be between 1 and 360");
    }

    #[test]
    fn test_app_error_mapping() {
        assert_eq!(
            ApiError::from(AppError::AuthenticationRequired).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(AppError::AuthorizationDenied).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(AppError::NotFound("Deal")).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(BackendError::Database(sqlx::Error::PoolClosed)).code(),
            ErrorCode::DatabaseError
        );
    }

    #[test]
    fn test_read_only_field_is_a_validation_error() {
        let err = ApiError::from(FormError::ReadOnlyField("initial_rate"));
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }
}
