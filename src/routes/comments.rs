use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiError;
use crate::helper::form_helpers::non_empty;
use crate::helper::validation_helpers::{is_valid_email, normalize_email, validate_comment_content, validate_name};
use crate::middleware::AuthenticatedUser;
use crate::models::db_operations::{comments_db_operations, get_conn, posts_db_operations};
use crate::models::NewComment;
use crate::DbPool;

pub const ANONYMOUS_NAME: &str = "Anonymous";
pub const ANONYMOUS_EMAIL: &str = "anonymous@anonymous.local";

#[derive(Deserialize)]
pub struct CommentListQuery {
    post_id: String,
    #[serde(default)]
    include_deleted: bool,
}

#[derive(Deserialize)]
pub struct CommentPayload {
    post_id: String,
    author_name: Option<String>,
    author_email: Option<String>,
    content: String,
    #[serde(default)]
    anonymous: bool,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/comments", web::get().to(list_comments))
        .route("/comments", web::post().to(create_comment))
        .route("/comments/{id}", web::delete().to(delete_comment));
}

/// Checks a submission and fills in the anonymous identity when asked for.
/// Every validation failure is a 422.
fn validate_payload(payload: CommentPayload) -> Result<NewComment, ApiError> {
    let content = validate_comment_content(&payload.content).map_err(ApiError::Unprocessable)?;

    let (author_name, author_email) = if payload.anonymous {
        (ANONYMOUS_NAME.to_string(), ANONYMOUS_EMAIL.to_string())
    } else {
        let name = validate_name(&payload.author_name.unwrap_or_default()).map_err(ApiError::Unprocessable)?;
        let email = non_empty(payload.author_email)
            .map(|e| normalize_email(&e))
            .filter(|e| is_valid_email(e))
            .ok_or_else(|| ApiError::Unprocessable("A valid email address is required.".to_string()))?;
        (name, email)
    };

    Ok(NewComment { post_id: payload.post_id, author_name, author_email, content })
}

async fn list_comments(
    pool: web::Data<DbPool>,
    query: web::Query<CommentListQuery>,
    user: Option<AuthenticatedUser>,
) -> Result<HttpResponse, ApiError> {
    let conn = get_conn(&pool)?;
    let include_deleted = query.include_deleted && user.is_some();
    let comments = comments_db_operations::list_comments_for_post(&conn, &query.post_id, include_deleted)?;
    Ok(HttpResponse::Ok().json(comments))
}

async fn create_comment(
    pool: web::Data<DbPool>,
    payload: web::Json<CommentPayload>,
) -> Result<HttpResponse, ApiError> {
    let conn = get_conn(&pool)?;
    if posts_db_operations::read_post(&conn, &payload.post_id, false)?.is_none() {
        return Err(ApiError::NotFound("Post not found.".to_string()));
    }

    let comment = validate_payload(payload.into_inner())?;
    let comment = comments_db_operations::create_comment(&conn, &comment)?;
    log::info!("New comment {} on post '{}'.", comment.id, comment.post_id);
    Ok(HttpResponse::Created().json(comment))
}

async fn delete_comment(
    pool: web::Data<DbPool>,
    id: web::Path<i64>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, ApiError> {
    let id = id.into_inner();
    let conn = get_conn(&pool)?;
    if !comments_db_operations::soft_delete_comment(&conn, id)? {
        return Err(ApiError::NotFound("Comment not found.".to_string()));
    }
    log::info!("User {} removed comment {}.", user.email, id);
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}
