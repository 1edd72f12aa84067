//! Storage error types.

use tempo_core::Error;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate: {0}")]
    Duplicate(String),
}

pub type DbResult<T> = std::result::Result<T, DbError>;

impl From<DbError> for Error {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => Error::NotFound(what),
            DbError::Duplicate(what) => Error::Conflict(what),
        }
    }
}
