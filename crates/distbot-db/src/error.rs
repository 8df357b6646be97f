//! Database error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl From<DbError> for distbot_core::Error {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => distbot_core::Error::NotFound(what),
            DbError::Duplicate(what) => distbot_core::Error::Conflict(what),
            other => distbot_core::Error::Internal(other.to_string()),
        }
    }
}

pub type DbResult<T> = std::result::Result<T, DbError>;

/// Parse a TEXT enum column.
pub(crate) fn parse_column<T>(value: &str) -> DbResult<T>
where
    T: std::str::FromStr<Err = String>,
{
    value.parse().map_err(DbError::InvalidData)
}
