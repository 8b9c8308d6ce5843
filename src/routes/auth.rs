use actix_session::Session;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiError;
use crate::helper::validation_helpers::normalize_email;
use crate::middleware::{AuthenticatedUser, SessionUser, SESSION_USER_KEY};
use crate::models::db_operations::{get_conn, users_db_operations};
use crate::DbPool;

#[derive(Deserialize)]
pub struct LoginRequest {
    email: String,
    password: String,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/auth/login", web::post().to(login))
        .route("/auth/logout", web::post().to(logout))
        .route("/auth/session", web::get().to(current_session));
}

async fn login(
    session: Session,
    pool: web::Data<DbPool>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let email = normalize_email(&body.email);
    let conn = get_conn(&pool)?;

    let Some(user) = users_db_operations::verify_credentials(&conn, &email, &body.password)? else {
        log::warn!("Failed login attempt for {}.", email);
        return Err(ApiError::Unauthorized("Invalid email or password.".to_string()));
    };

    if let Err(e) = users_db_operations::update_last_login(&conn, user.id) {
        log::error!("Failed to record last login for user {}: {}", user.id, e);
    }

    session.renew();
    session.insert(SESSION_USER_KEY, SessionUser::new(&user)).map_err(|e| {
        log::error!("Failed to write session for user {}: {}", user.id, e);
        ApiError::Internal
    })?;

    log::info!("User {} logged in.", user.email);
    Ok(HttpResponse::Ok().json(json!({ "user": user })))
}

async fn logout(session: Session) -> HttpResponse {
    session.purge();
    HttpResponse::Ok().json(json!({ "success": true }))
}

async fn current_session(user: AuthenticatedUser) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "user": user }))
}
