use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiError;
use crate::helper::validation_helpers::{is_valid_email, normalize_email, validate_name, validate_password};
use crate::middleware::AuthenticatedUser;
use crate::models::db_operations::{get_conn, users_db_operations};
use crate::models::{Role, UserUpdate};
use crate::DbPool;

#[derive(Deserialize)]
pub struct CreateUserRequest {
    email: String,
    name: String,
    password: String,
    role: Option<Role>,
}

#[derive(Deserialize)]
pub struct UpdateUserRequest {
    name: Option<String>,
    role: Option<Role>,
    is_active: Option<bool>,
    password: Option<String>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/admin", web::post().to(create_user))
        .route("/admin/users", web::get().to(list_users))
        .route("/admin/users/{id}", web::put().to(update_user))
        .route("/admin/users/{id}", web::delete().to(delete_user));
}

/// Validation shared with the setup CLI. Returns the normalized email and name.
pub fn validate_new_user(email: &str, name: &str, password: &str) -> Result<(String, String), ApiError> {
    let email = normalize_email(email);
    if !is_valid_email(&email) {
        return Err(ApiError::BadRequest("A valid email address is required.".to_string()));
    }
    let name = validate_name(name).map_err(ApiError::BadRequest)?;
    validate_password(password).map_err(ApiError::BadRequest)?;
    Ok((email, name))
}

async fn create_user(
    pool: web::Data<DbPool>,
    user: AuthenticatedUser,
    body: web::Json<CreateUserRequest>,
) -> Result<HttpResponse, ApiError> {
    user.require_admin()?;
    let body = body.into_inner();
    let (email, name) = validate_new_user(&body.email, &body.name, &body.password)?;

    let conn = get_conn(&pool)?;
    let created = users_db_operations::create_user(&conn, &email, &name, &body.password, body.role.unwrap_or(Role::Admin))?;
    log::info!("User {} created {} account {}.", user.email, created.role.as_str(), created.email);
    Ok(HttpResponse::Created().json(created))
}

async fn list_users(pool: web::Data<DbPool>, user: AuthenticatedUser) -> Result<HttpResponse, ApiError> {
    user.require_admin()?;
    let conn = get_conn(&pool)?;
    Ok(HttpResponse::Ok().json(users_db_operations::read_all_users(&conn)?))
}

async fn update_user(
    pool: web::Data<DbPool>,
    id: web::Path<i32>,
    user: AuthenticatedUser,
    body: web::Json<UpdateUserRequest>,
) -> Result<HttpResponse, ApiError> {
    user.require_admin()?;
    let id = id.into_inner();
    let body = body.into_inner();

    if id == user.id && (body.is_active == Some(false) || matches!(body.role, Some(role) if role != Role::Admin)) {
        return Err(ApiError::BadRequest("You cannot deactivate or demote your own account.".to_string()));
    }

    let name = match body.name {
        Some(name) => Some(validate_name(&name).map_err(ApiError::BadRequest)?),
        None => None,
    };
    if let Some(password) = body.password.as_deref() {
        validate_password(password).map_err(ApiError::BadRequest)?;
    }

    let update = UserUpdate { name, role: body.role, is_active: body.is_active, new_password: body.password };
    let conn = get_conn(&pool)?;
    let updated = users_db_operations::update_user(&conn, id, &update)?;
    log::info!("User {} updated account {}.", user.email, updated.email);
    Ok(HttpResponse::Ok().json(updated))
}

async fn delete_user(
    pool: web::Data<DbPool>,
    id: web::Path<i32>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, ApiError> {
    user.require_admin()?;
    let id = id.into_inner();
    if id == user.id {
        return Err(ApiError::BadRequest("You cannot delete your own account.".to_string()));
    }

    let conn = get_conn(&pool)?;
    if users_db_operations::delete_user(&conn, id)? == 0 {
        return Err(ApiError::NotFound("User not found.".to_string()));
    }
    log::info!("User {} deleted account {}.", user.email, id);
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}
