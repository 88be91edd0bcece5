//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use tutordesk_core::CoreError;
use tutordesk_store::StoreError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Forbidden - valid credentials but insufficient permissions.
    #[error("forbidden")]
    Forbidden,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Conflict - duplicate resource or invalid state transition.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Wallet balance too low.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Current balance.
        balance: i64,
        /// Required amount.
        required: i64,
    },

    /// Course ledger balance too low.
    #[error("insufficient course credits: remaining={remaining}, required={required}")]
    InsufficientCourseCredits {
        /// Remaining course credits.
        remaining: i64,
        /// Required amount.
        required: i64,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// External service error.
    #[error("external service error: {0}")]
    ExternalService(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::Forbidden => (StatusCode::FORBIDDEN, "forbidden", self.to_string(), None),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::InsufficientCredits { balance, required } => (
                StatusCode::PAYMENT_REQUIRED,
                "insufficient_credits",
                self.to_string(),
                Some(serde_json::json!({
                    "balance": balance,
                    "required": required
                })),
            ),
            Self::InsufficientCourseCredits {
                remaining,
                required,
            } => (
                StatusCode::PAYMENT_REQUIRED,
                "insufficient_course_credits",
                self.to_string(),
                Some(serde_json::json!({
                    "remaining": remaining,
                    "required": required
                })),
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            Self::ExternalService(msg) => (
                StatusCode::BAD_GATEWAY,
                "external_service_error",
                msg.clone(),
                None,
            ),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound(format!("{entity}: {id}")),
            StoreError::InsufficientCredits { balance, required } => {
                Self::InsufficientCredits { balance, required }
            }
            StoreError::InsufficientCourseCredits {
                remaining,
                required,
            } => Self::InsufficientCourseCredits {
                remaining,
                required,
            },
            StoreError::DuplicateAllocation {
                student_id,
                course_id,
            } => Self::Conflict(format!(
                "course credits already allocated for student {student_id} on course {course_id}"
            )),
            StoreError::AlreadyDecided => Self::Conflict("enrollment already decided".into()),
            StoreError::Conflict => {
                Self::Conflict("concurrent modification detected, retry the request".into())
            }
            StoreError::Database(msg) | StoreError::Serialization(msg) => Self::Internal(msg),
            StoreError::Domain(err) => err.into(),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidProposal { .. }
            | CoreError::OptionOutOfRange { .. }
            | CoreError::InvalidAmount(_)
            | CoreError::InvalidId(_) => Self::BadRequest(err.to_string()),
            CoreError::InsufficientCredits { balance, required } => {
                Self::InsufficientCredits { balance, required }
            }
            CoreError::InsufficientCourseCredits {
                remaining,
                required,
            } => Self::InsufficientCourseCredits {
                remaining,
                required,
            },
            CoreError::InvalidTransition { .. }
            | CoreError::TutorUnavailable { .. }
            | CoreError::DuplicateAllocation { .. }
            | CoreError::EnrollmentAlreadyDecided => Self::Conflict(err.to_string()),
        }
    }
}
