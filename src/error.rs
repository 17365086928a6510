use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::jwt::TokenError;

/// Shared user-facing error messages.
pub mod msg {
    pub const USER_NOT_FOUND: &str = "User not found";
    pub const PAYMENT_NOT_FOUND: &str = "Payment not found";
    pub const USER_EXISTS: &str = "Username or email already in use";
    pub const PAYMENT_EXISTS: &str = "A payment with this provider id already exists";
    pub const INVALID_CREDENTIALS: &str = "Invalid email or password";
    pub const WRONG_CURRENT_PASSWORD: &str = "Current password is incorrect";
    pub const ADMIN_REQUIRED: &str = "Administrator role required";
    pub const SUPERADMIN_REQUIRED: &str = "Only a superadmin can grant or revoke the superadmin role";
    pub const NOT_YOUR_ACCOUNT: &str = "You can only modify your own account";
    pub const MISSING_BEARER: &str = "Missing or malformed Authorization header";
    pub const INVALID_STATUS: &str = "Status must be one of: approved, pending, rejected, unknown";
    pub const INVALID_ROLE: &str = "Role must be one of: user, admin, superadmin";
    pub const EMAIL_EMPTY: &str = "Email cannot be empty";
    pub const INVALID_EMAIL_FORMAT: &str = "Invalid email format";
    pub const USERNAME_EMPTY: &str = "Username cannot be empty";
    pub const PASSWORD_TOO_SHORT: &str = "Password must be at least 8 characters";
    pub const INVALID_SIGNATURE_FORMAT: &str = "Invalid signature format";
    pub const INVALID_TIMESTAMP_IN_SIGNATURE: &str = "Invalid timestamp in signature";
    pub const INVALID_WEBHOOK_SECRET: &str = "Invalid webhook secret";
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    Expired,

    #[error("Token subject does not resolve to a user")]
    UnknownSubject,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upstream failure: {0}")]
    Upstream(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Taxonomy kind reported in the `error` field of the response body.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Unauthenticated(_) => "Unauthenticated",
            AppError::InvalidToken => "InvalidToken",
            AppError::Expired => "Expired",
            AppError::UnknownSubject => "UnknownSubject",
            AppError::Forbidden(_) => "Forbidden",
            AppError::NotFound(_) => "NotFound",
            AppError::Conflict(_) => "Conflict",
            AppError::Upstream(_) => "UpstreamFailure",
            AppError::BadRequest(_) | AppError::Json(_) => "ValidationFailure",
            AppError::Database(_) | AppError::Pool(_) | AppError::Internal(_) => "Internal",
        }
    }

    /// True when the underlying cause is a SQLite UNIQUE constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            AppError::Database(rusqlite::Error::SqliteFailure(e, _))
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        )
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => AppError::Expired,
            TokenError::Invalid(_) => AppError::InvalidToken,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let (status, details) = match &self {
            AppError::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, Some(msg.clone())),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, Some("Invalid token".into())),
            AppError::Expired => (StatusCode::UNAUTHORIZED, Some("Token has expired".into())),
            AppError::UnknownSubject => (
                StatusCode::UNAUTHORIZED,
                Some("No user matches this token".into()),
            ),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, Some(msg.clone())),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, Some(msg.clone())),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, Some(msg.clone())),
            AppError::Upstream(msg) => {
                tracing::error!("Upstream failure: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    Some("Payment provider request failed".into()),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, Some(msg.clone())),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, None)
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, None)
            }
            AppError::Json(e) => (StatusCode::BAD_REQUEST, Some(e.to_string())),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, None)
            }
        };

        let body = ErrorResponse {
            error: kind.to_string(),
            details,
        };

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Turns `Option<T>` lookups into `NotFound` errors.
pub trait OptionExt<T> {
    fn or_not_found(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_not_found(self, message: &str) -> Result<T> {
        self.ok_or_else(|| AppError::NotFound(message.to_string()))
    }
}
