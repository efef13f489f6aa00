use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::response::Envelope;

/// Credential and session failures. Messages are fixed strings so no internal
/// detail (e.g. why a JWT failed to decode) leaks to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Please provide an email and password!")]
    MissingCredentials,
    #[error("Incorrect email or password!")]
    InvalidCredentials,
    #[error("You are not logged in! Please log in to get access.")]
    NotLoggedIn,
    #[error("Invalid or expired token. Please log in again.")]
    InvalidToken,
    #[error("The user belonging to this token no longer exists.")]
    UserNoLongerExists,
    #[error("User recently changed password! Please log in again.")]
    PasswordChanged,
    #[error("Your current password is wrong.")]
    WrongCurrentPassword,
}

impl AuthError {
    fn status(self) -> StatusCode {
        match self {
            AuthError::MissingCredentials => StatusCode::BAD_REQUEST,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("You do not have permission to perform this action!")]
    Forbidden,
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(e) => e.status(),
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand to the client.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Internal(_) => "Something went wrong. Please try again later.".into(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(e) = &self {
            error!(error = ?e, "request failed");
        }
        let status = self.status();
        Envelope::<()>::failure(status, self.public_message()).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
