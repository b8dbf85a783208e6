/// Unified error types for the authentication gate
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why a request was rejected at the session layer
///
/// Every variant collapses to the same generic 401 at the API boundary; the
/// distinction exists for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnauthorizedReason {
    /// Token claims carry no session id
    NoSessionBinding,
    SessionNotFound,
    /// A cache tier holds an explicit negative for the session
    SessionInvalid,
    SessionRevoked,
    SessionExpired,
    AccountNotFound,
    /// Session owner's public id differs from the token subject
    SubjectMismatch,
    /// Token was issued before the account's force-logout timestamp
    InvalidatedBySecurityAction,
    /// The authoritative store could not be consulted
    ValidationError,
}

impl UnauthorizedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnauthorizedReason::NoSessionBinding => "no_session_binding",
            UnauthorizedReason::SessionNotFound => "session_not_found",
            UnauthorizedReason::SessionInvalid => "session_invalid",
            UnauthorizedReason::SessionRevoked => "session_revoked",
            UnauthorizedReason::SessionExpired => "session_expired",
            UnauthorizedReason::AccountNotFound => "account_not_found",
            UnauthorizedReason::SubjectMismatch => "subject_mismatch",
            UnauthorizedReason::InvalidatedBySecurityAction => "invalidated_by_security_action",
            UnauthorizedReason::ValidationError => "validation_error",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            UnauthorizedReason::NoSessionBinding => "token is not bound to a session",
            UnauthorizedReason::SessionNotFound => "session not found",
            UnauthorizedReason::SessionInvalid => "session invalid",
            UnauthorizedReason::SessionRevoked => "session revoked",
            UnauthorizedReason::SessionExpired => "session expired",
            UnauthorizedReason::AccountNotFound => "account not found",
            UnauthorizedReason::SubjectMismatch => "token subject does not match session owner",
            UnauthorizedReason::InvalidatedBySecurityAction => {
                "session invalidated by a security action"
            }
            UnauthorizedReason::ValidationError => "validation error",
        }
    }
}

impl fmt::Display for UnauthorizedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Main error type for the gate
#[derive(Error, Debug)]
pub enum GateError {
    /// Malformed, badly signed, expired or mis-addressed credential
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Session-layer rejection
    #[error("Unauthorized: {0}")]
    Unauthorized(UnauthorizedReason),

    /// Account exists but may not act
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Cache store unreachable or returned garbage
    #[error("Cache error: {0}")]
    Cache(String),

    /// Configuration errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GateError {
    /// Session-layer reason, if this is an `Unauthorized` rejection
    pub fn unauthorized_reason(&self) -> Option<UnauthorizedReason> {
        match self {
            GateError::Unauthorized(reason) => Some(*reason),
            _ => None,
        }
    }

    /// True for rejections that must be answered with 401
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, GateError::InvalidToken(_) | GateError::Unauthorized(_))
    }

    /// Short label used for metrics
    pub fn outcome_label(&self) -> &'static str {
        match self {
            GateError::InvalidToken(_) => "invalid_token",
            GateError::Unauthorized(reason) => reason.as_str(),
            GateError::Forbidden(_) => "forbidden",
            GateError::Database(_) => "database",
            GateError::Cache(_) => "cache",
            GateError::Validation(_) => "config",
            GateError::Internal(_) | GateError::Io(_) => "internal",
        }
    }

    /// Wrap for a response that carries the internal reason
    ///
    /// Only for servers running in trusted debug mode.
    pub fn with_detail(self) -> DetailedError {
        DetailedError(self)
    }
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

fn status_and_code(err: &GateError) -> (StatusCode, &'static str) {
    match err {
        GateError::InvalidToken(_) | GateError::Unauthorized(_) => {
            (StatusCode::UNAUTHORIZED, "AuthenticationRequired")
        }
        GateError::Forbidden(_) => (StatusCode::FORBIDDEN, "Forbidden"),
        GateError::Validation(_) => (StatusCode::BAD_REQUEST, "InvalidRequest"),
        GateError::Database(_)
        | GateError::Cache(_)
        | GateError::Internal(_)
        | GateError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "InternalServerError"),
    }
}

/// Convert GateError to HTTP response without leaking the reason
impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let (status, error_code) = status_and_code(&self);
        let message = match status {
            StatusCode::UNAUTHORIZED => "authentication required",
            StatusCode::FORBIDDEN => "access denied",
            StatusCode::BAD_REQUEST => "invalid request",
            _ => "Internal server error",
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message: message.to_string(),
        });

        (status, body).into_response()
    }
}

/// A `GateError` rendered with its full message
#[derive(Debug)]
pub struct DetailedError(pub GateError);

impl IntoResponse for DetailedError {
    fn into_response(self) -> Response {
        let (status, error_code) = status_and_code(&self.0);
        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message: self.0.to_string(),
        });

        (status, body).into_response()
    }
}

/// Result type alias for gate operations
pub type GateResult<T> = Result<T, GateError>;
