//! Worker error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("database error: {0}")]
    Db(#[from] distbot_db::DbError),

    #[error(transparent)]
    Service(#[from] distbot_core::Error),

    #[error("config error: {0}")]
    Config(#[from] distbot_config::ConfigError),

    #[error("queue error: {0}")]
    Queue(#[from] sqlx::Error),

    #[error("invalid task: {0}")]
    InvalidTask(String),
}

impl WorkerError {
    /// Whether running the task again later may succeed.
    pub fn is_retriable(&self) -> bool {
        match self {
            WorkerError::Service(e) => e.is_retriable(),
            WorkerError::Queue(_) => true,
            _ => false,
        }
    }
}

pub type WorkerResult<T> = std::result::Result<T, WorkerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_classification() {
        let err: WorkerError = distbot_core::Error::retriable("bodhi", "not tagged yet").into();
        assert!(err.is_retriable());

        let err: WorkerError = distbot_core::Error::service("copr", "bad chroot").into();
        assert!(!err.is_retriable());

        let err = WorkerError::InvalidTask("no job config".into());
        assert!(!err.is_retriable());
    }
}
