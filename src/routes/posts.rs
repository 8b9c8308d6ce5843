use actix_web::{web, HttpResponse};
use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiError;
use crate::helper::content_helpers::{derive_excerpt, estimate_read_time, normalize_content, plain_text};
use crate::helper::email_helpers::NewsletterMessage;
use crate::helper::form_helpers::{deserialize_tags, non_empty};
use crate::helper::sanitization_helpers::strip_all_html;
use crate::helper::slug_helpers::{ensure_unique_slug, slugify, SlugTable};
use crate::middleware::AuthenticatedUser;
use crate::models::db_operations::posts_db_operations::{self, PostFilter};
use crate::models::db_operations::{get_conn, DbError};
use crate::models::{ContentInput, Post, PostDraft};
use crate::routes::{announce, page};
use crate::{AppState, DbPool};

pub const DEFAULT_CATEGORY: &str = "General";
/// Base slug for titles that slugify to nothing (e.g. no ASCII letters or digits).
pub const FALLBACK_SLUG: &str = "post";

#[derive(Deserialize)]
pub struct PostListQuery {
    limit: Option<u32>,
    offset: Option<u32>,
    tag: Option<String>,
    category: Option<String>,
    author: Option<String>,
    #[serde(default)]
    include_deleted: bool,
}

#[derive(Deserialize)]
pub struct PostReadQuery {
    #[serde(default)]
    include_deleted: bool,
}

fn default_true() -> bool {
    true
}

/// Body of a create or update request. Missing derived fields (slug, excerpt,
/// read time) are computed from the title and content.
#[derive(Deserialize)]
pub struct PostPayload {
    title: String,
    content: ContentInput,
    excerpt: Option<String>,
    author: Option<String>,
    #[serde(default, deserialize_with = "deserialize_tags")]
    tags: Vec<String>,
    image: Option<String>,
    read_time: Option<String>,
    slug: Option<String>,
    date: Option<NaiveDate>,
    category: Option<String>,
    #[serde(default = "default_true")]
    notify_subscribers: bool,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/posts", web::get().to(list_posts))
        .route("/posts", web::post().to(create_post))
        .route("/posts/{id}/pin", web::post().to(pin_post))
        .route("/posts/{id}/pin", web::delete().to(unpin_post))
        .route("/posts/{slug}", web::get().to(get_post))
        .route("/posts/{id}", web::put().to(update_post))
        .route("/posts/{id}", web::delete().to(delete_post));
}

fn build_draft(
    conn: &Connection,
    payload: PostPayload,
    user: &AuthenticatedUser,
    existing: Option<&Post>,
) -> Result<PostDraft, ApiError> {
    let title = strip_all_html(payload.title.trim()).trim().to_string();
    if title.is_empty() {
        return Err(ApiError::BadRequest("Title is required.".to_string()));
    }

    let content = normalize_content(payload.content).map_err(ApiError::BadRequest)?;
    let text = plain_text(&content);

    let base_slug = match non_empty(payload.slug) {
        Some(slug) => slugify(&slug),
        None => match existing {
            Some(post) => post.slug.clone(),
            None => slugify(&title),
        },
    };
    let base_slug = if base_slug.is_empty() { FALLBACK_SLUG.to_string() } else { base_slug };
    let slug = ensure_unique_slug(conn, SlugTable::Posts, &base_slug, existing.map(|p| p.id.as_str()))
        .map_err(DbError::from)?;

    Ok(PostDraft {
        excerpt: non_empty(payload.excerpt).unwrap_or_else(|| derive_excerpt(&text)),
        read_time: non_empty(payload.read_time).unwrap_or_else(|| estimate_read_time(&text)),
        author: non_empty(payload.author).unwrap_or_else(|| user.name.clone()),
        tags: payload.tags,
        image: non_empty(payload.image),
        date: payload
            .date
            .or(existing.map(|p| p.date))
            .unwrap_or_else(|| Utc::now().date_naive()),
        category: non_empty(payload.category).unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        title,
        content,
        slug,
    })
}

async fn list_posts(
    pool: web::Data<DbPool>,
    query: web::Query<PostListQuery>,
    user: Option<AuthenticatedUser>,
) -> Result<HttpResponse, ApiError> {
    let query = query.into_inner();
    let (limit, offset) = page(query.limit, query.offset);
    let filter = PostFilter {
        tag: non_empty(query.tag),
        category: non_empty(query.category),
        author: non_empty(query.author),
        include_deleted: query.include_deleted && user.is_some(),
        limit,
        offset,
    };

    let conn = get_conn(&pool)?;
    let posts = posts_db_operations::list_posts(&conn, &filter)?;
    Ok(HttpResponse::Ok().json(posts))
}

async fn get_post(
    pool: web::Data<DbPool>,
    slug: web::Path<String>,
    query: web::Query<PostReadQuery>,
    user: Option<AuthenticatedUser>,
) -> Result<HttpResponse, ApiError> {
    let include_deleted = query.include_deleted && user.is_some();
    let conn = get_conn(&pool)?;
    match posts_db_operations::read_post_by_slug_or_id(&conn, &slug, include_deleted)? {
        Some(post) => Ok(HttpResponse::Ok().json(post)),
        None => Err(ApiError::NotFound("Post not found.".to_string())),
    }
}

async fn create_post(
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    payload: web::Json<PostPayload>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    let notify = payload.notify_subscribers;

    let conn = get_conn(&pool)?;
    let draft = build_draft(&conn, payload, &user, None)?;
    let post = posts_db_operations::create_post(&conn, &draft, user.id)?;
    log::info!("User {} created post '{}' ({}).", user.email, post.slug, post.id);

    if notify {
        announce(&conn, &state, NewsletterMessage::for_post(&post, &state.site_url));
    }
    Ok(HttpResponse::Created().json(post))
}

fn load_owned_post(conn: &Connection, id: &str, user: &AuthenticatedUser) -> Result<Post, ApiError> {
    let post = posts_db_operations::read_post(conn, id, false)?
        .ok_or_else(|| ApiError::NotFound("Post not found.".to_string()))?;
    user.require_owner(post.created_by)?;
    Ok(post)
}

async fn update_post(
    pool: web::Data<DbPool>,
    id: web::Path<String>,
    user: AuthenticatedUser,
    payload: web::Json<PostPayload>,
) -> Result<HttpResponse, ApiError> {
    let conn = get_conn(&pool)?;
    let existing = load_owned_post(&conn, &id, &user)?;
    let draft = build_draft(&conn, payload.into_inner(), &user, Some(&existing))?;
    let post = posts_db_operations::update_post(&conn, &id, &draft, user.id)?;
    log::info!("User {} updated post '{}'.", user.email, post.id);
    Ok(HttpResponse::Ok().json(post))
}

async fn delete_post(
    pool: web::Data<DbPool>,
    id: web::Path<String>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, ApiError> {
    let conn = get_conn(&pool)?;
    let post = load_owned_post(&conn, &id, &user)?;

    if !posts_db_operations::soft_delete_post(&conn, &id, user.id)? {
        return Err(ApiError::NotFound("Post not found.".to_string()));
    }
    log::info!("User {} deleted post '{}'.", user.email, post.id);
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

async fn pin_post(
    pool: web::Data<DbPool>,
    id: web::Path<String>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, ApiError> {
    let conn = get_conn(&pool)?;
    posts_db_operations::pin_post(&conn, &id)?;
    log::info!("User {} pinned post '{}'.", user.email, id);
    Ok(HttpResponse::Ok().json(json!({ "success": true, "pinned": id.into_inner() })))
}

async fn unpin_post(
    pool: web::Data<DbPool>,
    id: web::Path<String>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, ApiError> {
    let conn = get_conn(&pool)?;
    posts_db_operations::unpin_post(&conn, &id)?;
    log::info!("User {} unpinned post '{}'.", user.email, id);
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}
