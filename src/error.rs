use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Failure taxonomy for the whole service. Every layer below the HTTP
/// handlers returns these; translation to status codes and wire bodies
/// happens exactly once, in `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("email already in use")]
    DuplicateEmail,
    #[error("user not found")]
    UserNotFound,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("access token required")]
    MissingToken,
    #[error("invalid token")]
    InvalidToken,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Login must not reveal whether the email exists: an unknown email and a
    /// wrong password produce the same client-facing error.
    pub fn for_login(self) -> Self {
        match self {
            Self::UserNotFound => Self::InvalidCredentials,
            other => other,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "INVALID_DATA",
            Self::DuplicateEmail => "EMAIL_ALREADY_USED",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            // One code for every token failure; only the message differs.
            Self::MissingToken | Self::InvalidToken => "MISSING_OR_INVALID_TOKEN",
            Self::Internal(_) => "SERVER_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::DuplicateEmail => StatusCode::CONFLICT,
            Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::InvalidCredentials | Self::MissingToken | Self::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Validation(msg) => msg.clone(),
            Self::DuplicateEmail => "This email is already in use".into(),
            Self::UserNotFound => "User not found".into(),
            Self::InvalidCredentials => "Invalid email or password".into(),
            Self::MissingToken => "Access token required".into(),
            Self::InvalidToken => "Invalid token".into(),
            // Never leak internals into the wire body.
            Self::Internal(e) => {
                error!(error = %e, "internal error");
                "Internal server error".into()
            }
        };
        let body = ErrorBody {
            error: self.code(),
            message,
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            // The UNIQUE(email) constraint closes the race between the
            // service-level pre-check and the insert/update.
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::DuplicateEmail,
            sqlx::Error::RowNotFound => Self::UserNotFound,
            _ => Self::Internal(e.into()),
        }
    }
}
