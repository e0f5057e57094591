//! Database error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No recognized citation column pair on table '{0}'")]
    RelationColumnsNotFound(String),

    #[error("Invalid column name: {0}")]
    InvalidColumn(String),
}
