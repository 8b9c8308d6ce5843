use actix_web::{web, HttpResponse};
use rusqlite::Connection;
use serde_json::json;

use crate::error::ApiError;
use crate::helper::email_helpers::{NewsletterMessage, Recipient};
use crate::models::db_operations::{get_conn, subscribers_db_operations};
use crate::{AppState, DbPool};

pub mod admin;
pub mod auth;
pub mod comments;
pub mod letters;
pub mod posts;
pub mod subscribers;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Mounts every JSON endpoint under `/api`. Extractor failures render as the
/// same `{"error": ...}` body as handler errors.
pub fn config_api(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into()))
        .app_data(web::QueryConfig::default().error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into()))
        .app_data(web::PathConfig::default().error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into()))
        .service(
            web::scope("/api")
                .route("/health", web::get().to(health))
                .configure(auth::config)
                .configure(posts::config)
                .configure(letters::config)
                .configure(comments::config)
                .configure(subscribers::config)
                .configure(admin::config),
        );
}

async fn health(pool: web::Data<DbPool>) -> Result<HttpResponse, ApiError> {
    let conn = get_conn(&pool)?;
    conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
        .map_err(|e| {
            log::error!("Health check query failed: {}", e);
            ApiError::Internal
        })?;
    Ok(HttpResponse::Ok().json(json!({ "status": "ok" })))
}

pub(crate) fn page(limit: Option<u32>, offset: Option<u32>) -> (u32, u32) {
    (limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE), offset.unwrap_or(0))
}

/// Queues a newsletter for every active subscriber. Nothing here can fail the
/// request that triggered it.
pub(crate) fn announce(conn: &Connection, state: &AppState, message: NewsletterMessage) {
    let Some(newsletter) = state.newsletter.as_ref() else {
        log::debug!("Email is not configured; '{}' will not be announced.", message.title);
        return;
    };

    let recipients = match subscribers_db_operations::list_active_subscribers(conn) {
        Ok(subscribers) => subscribers
            .into_iter()
            .map(|s| Recipient { email: s.email, unsubscribe_token: s.unsubscribe_token })
            .collect::<Vec<_>>(),
        Err(e) => {
            log::error!("Could not load subscribers to announce '{}': {}", message.title, e);
            return;
        }
    };

    log::info!("Announcing '{}' to {} subscriber(s).", message.title, recipients.len());
    newsletter.spawn_broadcast(state.site_url.clone(), message, recipients);
}
