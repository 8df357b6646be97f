//! Error types for distbot.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// A call to an external service failed. `retriable` marks failures
    /// that are expected to go away (timeouts, 5xx, builds not tagged yet).
    #[error("{service} error: {message}")]
    Service {
        service: &'static str,
        message: String,
        retriable: bool,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn service(service: &'static str, message: impl Into<String>) -> Self {
        Error::Service {
            service,
            message: message.into(),
            retriable: false,
        }
    }

    pub fn retriable(service: &'static str, message: impl Into<String>) -> Self {
        Error::Service {
            service,
            message: message.into(),
            retriable: true,
        }
    }

    pub fn is_retriable(&self) -> bool {
        matches!(self, Error::Service { retriable: true, .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
