use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{ErrorCode, Row};
use thiserror::Error;

use crate::models::RichContent;
use crate::DbPool;

pub mod comments_db_operations;
pub mod letters_db_operations;
pub mod posts_db_operations;
pub mod subscribers_db_operations;
pub mod users_db_operations;

pub type DbConn = PooledConnection<SqliteConnectionManager>;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("R2D2 pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("Password hashing error: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Invalid(String),
}

impl DbError {
    /// True when SQLite rejected a write because of a UNIQUE (or primary key) constraint.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DbError::Rusqlite(rusqlite::Error::SqliteFailure(e, _)) => {
                e.code == ErrorCode::ConstraintViolation
                    && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
            }
            _ => false,
        }
    }
}

/// Checks a connection out of the pool. It returns to the pool when dropped.
pub fn get_conn(pool: &DbPool) -> Result<DbConn, DbError> {
    pool.get().map_err(DbError::Pool)
}

/// Reads a `(content_format, content)` column pair into a [`RichContent`].
pub(crate) fn content_from_row(row: &Row, format_idx: usize, body_idx: usize) -> rusqlite::Result<RichContent> {
    let format: String = row.get(format_idx)?;
    let body: String = row.get(body_idx)?;
    RichContent::from_columns(&format, body)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(body_idx, Type::Text, e.into()))
}

/// Tags are persisted as a JSON array of strings.
pub(crate) fn tags_from_row(row: &Row, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn tags_to_column(tags: &[String]) -> Result<String, serde_json::Error> {
    serde_json::to_string(tags)
}
