//! Error Module
//!
//! Every failure the client can report, each carrying a message fit to show
//! an operator verbatim.

use serde::Deserialize;

/// Coarse classification of an [`ApiError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    AuthFailure,
    InvalidCredentials,
    NotFound,
    ValidationRejected,
    ServerError,
    NetworkFailure,
    Parse,
    PreconditionViolation,
}

/// API errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    /// 401 on an authenticated call; the token has been cleared
    #[error("{0}")]
    Unauthorized(String),

    /// Login exchange refused or returned no token
    #[error("{0}")]
    InvalidCredentials(String),

    #[error("{0}")]
    NotFound(String),

    /// Any other 4xx
    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("{message}")]
    Server { status: u16, message: String },

    /// No response received at all
    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    /// Caller-side problem detected before any request was sent
    #[error("{0}")]
    Precondition(String),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Unauthorized(_) => ErrorKind::AuthFailure,
            ApiError::InvalidCredentials(_) => ErrorKind::InvalidCredentials,
            ApiError::NotFound(_) => ErrorKind::NotFound,
            ApiError::Rejected { .. } => ErrorKind::ValidationRejected,
            ApiError::Server { .. } => ErrorKind::ServerError,
            ApiError::Network(_) => ErrorKind::NetworkFailure,
            ApiError::Parse(_) => ErrorKind::Parse,
            ApiError::Precondition(_) => ErrorKind::PreconditionViolation,
        }
    }

    /// HTTP status behind this error, when there was a response
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized(_) => Some(401),
            ApiError::NotFound(_) => Some(404),
            ApiError::Rejected { status, .. } | ApiError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        self.kind() == ErrorKind::AuthFailure
    }
}

/// Structured error body: `{ "detail": ... }`
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    detail: Detail,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Detail {
    Message(String),
    /// Request validation failures: `[{ "loc": [...], "msg": "...", ... }]`
    Violations(Vec<Violation>),
}

#[derive(Debug, Deserialize)]
struct Violation {
    msg: String,
}

impl ErrorBody {
    /// Human-readable message from a raw error body, if it has the expected shape
    pub(crate) fn message_from(body: &[u8]) -> Option<String> {
        let parsed: ErrorBody = serde_json::from_slice(body).ok()?;
        let message = match parsed.detail {
            Detail::Message(message) => message,
            Detail::Violations(violations) => violations
                .into_iter()
                .map(|v| v.msg)
                .collect::<Vec<_>>()
                .join("; "),
        };
        (!message.trim().is_empty()).then_some(message)
    }
}
