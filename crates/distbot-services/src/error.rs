//! Service client errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Command failed: {0}")]
    Command(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    /// Network failures, rate limits and server errors are worth retrying.
    pub fn is_retriable(&self) -> bool {
        match self {
            ServiceError::Request(_) => true,
            ServiceError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn into_core(self, service: &'static str) -> distbot_core::Error {
        if self.is_retriable() {
            distbot_core::Error::retriable(service, self.to_string())
        } else {
            distbot_core::Error::service(service, self.to_string())
        }
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_classification() {
        assert!(ServiceError::Request("timeout".into()).is_retriable());
        assert!(
            ServiceError::Api {
                status: 503,
                message: "unavailable".into()
            }
            .is_retriable()
        );
        let not_found = ServiceError::Api {
            status: 404,
            message: "missing".into(),
        };
        assert!(!not_found.is_retriable());
        assert!(!not_found.into_core("copr").is_retriable());
    }
}
