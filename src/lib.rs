use std::path::Path;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::helper::email_helpers::Newsletter;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Shared, read-only state handed to every handler.
pub struct AppState {
    pub site_url: String,
    /// `None` when no email provider is configured.
    pub newsletter: Option<Newsletter>,
}

/// Opens the pooled connection set for the SQLite file at `database_path`.
/// Every connection enforces foreign keys.
pub fn build_pool(database_path: &Path, max_size: u32) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path)
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
    Pool::builder().max_size(max_size).build(manager)
}

pub mod config;
pub mod error;
pub mod helper;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod setup;

#[cfg(test)]
pub(crate) mod test_support;
