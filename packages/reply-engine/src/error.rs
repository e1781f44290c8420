//! Error taxonomy and the engine's error boundary.
//!
//! # The Error Boundary Rule
//!
//! > No raw error ever crosses the engine boundary.
//!
//! - `anyhow` is internal transport on the collaborator seam (ergonomic for
//!   HTTP-client implementations)
//! - the snapshot's single `error` string is the only externalized message,
//!   sanitized per category
//!
//! Collaborator implementations should return [`ApiError`] (possibly wrapped
//! in `anyhow` context); the engine downcasts to categorize. Anything it
//! cannot categorize falls back to a generic retryable message.

use std::borrow::Cow;
use std::fmt;

use thiserror::Error;

/// Failure category surfaced to the UI.
///
/// Only the category and its sanitized message ever leave the engine.
/// Internal detail (status codes, endpoints, backtraces) is logged, never
/// surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed email / empty reply / expired post. Resolved locally,
    /// never reaches the failed phase.
    Validation,
    /// Bad or expired credential. Terminal for the attempt; requires new
    /// user input.
    Auth,
    /// Timeout or network failure. Retryable without new input.
    Transient,
    /// The email gained an account mid-flow. Routed back into the login
    /// sub-path rather than surfaced as a hard failure.
    Conflict,
}

impl ErrorKind {
    /// Whether `retry()` may blindly re-issue the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Transient)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Auth => write!(f, "auth"),
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::Conflict => write!(f, "conflict"),
        }
    }
}

/// Structured error for the collaborator seam.
///
/// HTTP-client implementations of the collaborator traits map their wire
/// failures into these variants so the engine can categorize without
/// string-matching.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid credential")]
    InvalidCredential,

    #[error("not authorized")]
    Unauthorized,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("server returned status {status}")]
    Server { status: u16, message: String },
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Timeout | ApiError::Network(_) => ErrorKind::Transient,
            ApiError::InvalidCredential | ApiError::Unauthorized => ErrorKind::Auth,
            ApiError::Conflict(_) => ErrorKind::Conflict,
            ApiError::Server { status, .. } => match status {
                401 | 403 => ErrorKind::Auth,
                409 => ErrorKind::Conflict,
                _ => ErrorKind::Transient,
            },
        }
    }

    /// Sanitized, user-safe message. Never includes status codes, endpoints
    /// or upstream detail.
    pub fn safe_message(&self) -> Cow<'static, str> {
        match self.kind() {
            ErrorKind::Transient => match self {
                ApiError::Timeout => "The operation timed out. Please try again.".into(),
                _ => "Something went wrong talking to the server. Please try again.".into(),
            },
            ErrorKind::Auth => "We couldn't sign you in. Please log in and try again.".into(),
            ErrorKind::Conflict => {
                "That email address already has an account. Please log in to continue.".into()
            }
            ErrorKind::Validation => "Please check your reply and try again.".into(),
        }
    }
}

/// Categorize and sanitize a collaborator failure.
///
/// Downcasts to [`ApiError`] when possible; anything else is treated as a
/// transient internal failure with a generic message. The raw error must be
/// logged by the caller before sanitization discards it.
pub fn categorize(error: &anyhow::Error) -> (ErrorKind, String) {
    if let Some(api) = error.downcast_ref::<ApiError>() {
        return (api.kind(), api.safe_message().into_owned());
    }

    // NEVER use error.to_string() here - it may contain sensitive data
    (
        ErrorKind::Transient,
        "Something went wrong. Please try again.".to_string(),
    )
}
