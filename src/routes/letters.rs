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
use crate::models::db_operations::letters_db_operations::{self, LetterCounter, LetterFilter};
use crate::models::db_operations::{get_conn, DbError};
use crate::models::{ContentInput, Letter, LetterDraft};
use crate::routes::{announce, page};
use crate::{AppState, DbPool};

/// Base slug for titles that slugify to nothing.
pub const FALLBACK_SLUG: &str = "letter";

#[derive(Deserialize)]
pub struct LetterListQuery {
    limit: Option<u32>,
    offset: Option<u32>,
    series: Option<String>,
    tag: Option<String>,
    #[serde(default)]
    include_deleted: bool,
}

#[derive(Deserialize)]
pub struct LetterReadQuery {
    #[serde(default)]
    include_deleted: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
pub struct LetterPayload {
    letter_number: Option<i64>,
    title: String,
    subtitle: Option<String>,
    recipient: Option<String>,
    content: ContentInput,
    excerpt: Option<String>,
    author: Option<String>,
    slug: Option<String>,
    image: Option<String>,
    read_time: Option<String>,
    published_date: Option<NaiveDate>,
    series: Option<String>,
    #[serde(default, deserialize_with = "deserialize_tags")]
    tags: Vec<String>,
    #[serde(default = "default_true")]
    notify_subscribers: bool,
}

#[derive(Deserialize)]
pub struct FeatureRequest {
    id: String,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/letters", web::get().to(list_letters))
        .route("/letters", web::post().to(create_letter))
        .route("/letters/featured", web::get().to(get_featured_letter))
        .route("/letters/series", web::get().to(list_series))
        .route("/letters/feature", web::post().to(feature_letter))
        .route("/letters/unfeature", web::post().to(unfeature_letter))
        .route("/letters/{id}/views", web::post().to(record_view))
        .route("/letters/{id}/shares", web::post().to(record_share))
        .route("/letters/{slug}", web::get().to(get_letter))
        .route("/letters/{id}", web::put().to(update_letter))
        .route("/letters/{id}", web::delete().to(delete_letter));
}

fn build_draft(
    conn: &Connection,
    payload: LetterPayload,
    user: &AuthenticatedUser,
    existing: Option<&Letter>,
) -> Result<LetterDraft, ApiError> {
    let title = strip_all_html(payload.title.trim()).trim().to_string();
    if title.is_empty() {
        return Err(ApiError::BadRequest("Title is required.".to_string()));
    }
    if matches!(payload.letter_number, Some(n) if n < 1) {
        return Err(ApiError::BadRequest("Letter number must be positive.".to_string()));
    }

    let content = normalize_content(payload.content).map_err(ApiError::BadRequest)?;
    let text = plain_text(&content);

    let base_slug = match non_empty(payload.slug) {
        Some(slug) => slugify(&slug),
        None => match existing {
            Some(letter) => letter.slug.clone(),
            None => slugify(&title),
        },
    };
    let base_slug = if base_slug.is_empty() { FALLBACK_SLUG.to_string() } else { base_slug };
    let slug = ensure_unique_slug(conn, SlugTable::Letters, &base_slug, existing.map(|l| l.id.as_str()))
        .map_err(DbError::from)?;

    Ok(LetterDraft {
        letter_number: payload.letter_number,
        subtitle: non_empty(payload.subtitle),
        recipient: non_empty(payload.recipient),
        excerpt: non_empty(payload.excerpt).unwrap_or_else(|| derive_excerpt(&text)),
        read_time: non_empty(payload.read_time).unwrap_or_else(|| estimate_read_time(&text)),
        author: non_empty(payload.author).unwrap_or_else(|| user.name.clone()),
        image: non_empty(payload.image),
        published_date: payload
            .published_date
            .or(existing.map(|l| l.published_date))
            .unwrap_or_else(|| Utc::now().date_naive()),
        series: non_empty(payload.series),
        tags: payload.tags,
        title,
        content,
        slug,
    })
}

async fn list_letters(
    pool: web::Data<DbPool>,
    query: web::Query<LetterListQuery>,
    user: Option<AuthenticatedUser>,
) -> Result<HttpResponse, ApiError> {
    let query = query.into_inner();
    let (limit, offset) = page(query.limit, query.offset);
    let filter = LetterFilter {
        series: non_empty(query.series),
        tag: non_empty(query.tag),
        include_deleted: query.include_deleted && user.is_some(),
        limit,
        offset,
    };

    let conn = get_conn(&pool)?;
    Ok(HttpResponse::Ok().json(letters_db_operations::list_letters(&conn, &filter)?))
}

async fn get_featured_letter(pool: web::Data<DbPool>) -> Result<HttpResponse, ApiError> {
    let conn = get_conn(&pool)?;
    Ok(HttpResponse::Ok().json(letters_db_operations::read_featured_letter(&conn)?))
}

async fn list_series(pool: web::Data<DbPool>) -> Result<HttpResponse, ApiError> {
    let conn = get_conn(&pool)?;
    Ok(HttpResponse::Ok().json(letters_db_operations::list_series(&conn)?))
}

async fn get_letter(
    pool: web::Data<DbPool>,
    slug: web::Path<String>,
    query: web::Query<LetterReadQuery>,
    user: Option<AuthenticatedUser>,
) -> Result<HttpResponse, ApiError> {
    let include_deleted = query.include_deleted && user.is_some();
    let conn = get_conn(&pool)?;
    match letters_db_operations::read_letter_by_slug_or_id(&conn, &slug, include_deleted)? {
        Some(letter) => Ok(HttpResponse::Ok().json(letter)),
        None => Err(ApiError::NotFound("Letter not found.".to_string())),
    }
}

async fn bump(pool: &DbPool, id: &str, counter: LetterCounter) -> Result<HttpResponse, ApiError> {
    let conn = get_conn(pool)?;
    let value = letters_db_operations::increment_counter(&conn, id, counter)?;
    let body = match counter {
        LetterCounter::Views => json!({ "views": value }),
        LetterCounter::Shares => json!({ "shares": value }),
    };
    Ok(HttpResponse::Ok().json(body))
}

async fn record_view(pool: web::Data<DbPool>, id: web::Path<String>) -> Result<HttpResponse, ApiError> {
    bump(&pool, &id, LetterCounter::Views).await
}

async fn record_share(pool: web::Data<DbPool>, id: web::Path<String>) -> Result<HttpResponse, ApiError> {
    bump(&pool, &id, LetterCounter::Shares).await
}

async fn create_letter(
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    payload: web::Json<LetterPayload>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    let notify = payload.notify_subscribers;

    let conn = get_conn(&pool)?;
    let draft = build_draft(&conn, payload, &user, None)?;
    let letter = letters_db_operations::create_letter(&conn, &draft, user.id)?;
    log::info!("User {} created letter #{} '{}'.", user.email, letter.letter_number, letter.slug);

    if notify {
        announce(&conn, &state, NewsletterMessage::for_letter(&letter, &state.site_url));
    }
    Ok(HttpResponse::Created().json(letter))
}

async fn update_letter(
    pool: web::Data<DbPool>,
    id: web::Path<String>,
    user: AuthenticatedUser,
    payload: web::Json<LetterPayload>,
) -> Result<HttpResponse, ApiError> {
    let conn = get_conn(&pool)?;
    let existing = letters_db_operations::read_letter(&conn, &id, false)?
        .ok_or_else(|| ApiError::NotFound("Letter not found.".to_string()))?;
    user.require_owner(existing.created_by)?;

    let draft = build_draft(&conn, payload.into_inner(), &user, Some(&existing))?;
    let letter = letters_db_operations::update_letter(&conn, &id, &draft, user.id)?;
    log::info!("User {} updated letter '{}'.", user.email, letter.id);
    Ok(HttpResponse::Ok().json(letter))
}

async fn delete_letter(
    pool: web::Data<DbPool>,
    id: web::Path<String>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, ApiError> {
    let conn = get_conn(&pool)?;
    let letter = letters_db_operations::read_letter(&conn, &id, false)?
        .ok_or_else(|| ApiError::NotFound("Letter not found.".to_string()))?;
    user.require_owner(letter.created_by)?;

    if !letters_db_operations::soft_delete_letter(&conn, &id, user.id)? {
        return Err(ApiError::NotFound("Letter not found.".to_string()));
    }
    log::info!("User {} deleted letter '{}'.", user.email, letter.id);
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

async fn feature_letter(
    pool: web::Data<DbPool>,
    user: AuthenticatedUser,
    body: web::Json<FeatureRequest>,
) -> Result<HttpResponse, ApiError> {
    let conn = get_conn(&pool)?;
    letters_db_operations::feature_letter(&conn, &body.id)?;
    log::info!("User {} featured letter '{}'.", user.email, body.id);
    Ok(HttpResponse::Ok().json(json!({ "success": true, "featured": body.id })))
}

async fn unfeature_letter(
    pool: web::Data<DbPool>,
    user: AuthenticatedUser,
    body: web::Json<FeatureRequest>,
) -> Result<HttpResponse, ApiError> {
    let conn = get_conn(&pool)?;
    letters_db_operations::unfeature_letter(&conn, &body.id)?;
    log::info!("User {} unfeatured letter '{}'.", user.email, body.id);
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use crate::models::Role;
    use crate::test_support::{login_cookie, memory_pool, seed_user, test_app};
    use actix_web::{http::StatusCode, test};
    use serde_json::{json, Value};

    #[actix_web::test]
    async fn letters_are_numbered_featured_and_counted() {
        let pool = memory_pool();
        {
            let conn = pool.get().unwrap();
            seed_user(&conn, "writer@example.com", Role::Author);
        }
        let app = test::init_service(test_app(pool)).await;
        let cookie = login_cookie!(app, "writer@example.com");

        let mut ids = Vec::new();
        for (title, series) in [("Dear Reader", "Openings"), ("Dear Friend", "Openings")] {
            let req = test::TestRequest::post()
                .uri("/api/letters")
                .cookie(cookie.clone())
                .set_json(json!({
                    "title": title,
                    "content": { "type": "doc", "content": [{ "type": "text", "text": "hello there" }] },
                    "series": series,
                    "notify_subscribers": false
                }))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::CREATED);
            let letter: Value = test::read_body_json(resp).await;
            assert_eq!(letter["content"]["format"], "document");
            ids.push((letter["id"].as_str().unwrap().to_string(), letter["letter_number"].as_i64().unwrap()));
        }
        assert_eq!(ids[0].1 + 1, ids[1].1);

        let listed: Value =
            test::read_body_json(test::call_service(&app, test::TestRequest::get().uri("/api/letters").to_request()).await)
                .await;
        assert_eq!(listed[0]["id"], ids[1].0);

        let series: Value = test::read_body_json(
            test::call_service(&app, test::TestRequest::get().uri("/api/letters/series").to_request()).await,
        )
        .await;
        assert_eq!(series, json!([{ "series": "Openings", "letter_count": 2 }]));

        for (id, _) in &ids {
            let req = test::TestRequest::post()
                .uri("/api/letters/feature")
                .cookie(cookie.clone())
                .set_json(json!({ "id": id }))
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        }
        let featured: Value = test::read_body_json(
            test::call_service(&app, test::TestRequest::get().uri("/api/letters/featured").to_request()).await,
        )
        .await;
        assert_eq!(featured["id"], ids[1].0);

        let req = test::TestRequest::post().uri(&format!("/api/letters/{}/views", ids[0].0)).to_request();
        let views: Value = test::read_body_json(test::call_service(&app, req).await).await;
        assert_eq!(views["views"], 1);

        let req = test::TestRequest::post().uri("/api/letters/nope/shares").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn duplicate_letter_number_is_a_conflict() {
        let pool = memory_pool();
        {
            let conn = pool.get().unwrap();
            seed_user(&conn, "writer@example.com", Role::Admin);
        }
        let app = test::init_service(test_app(pool)).await;
        let cookie = login_cookie!(app, "writer@example.com");

        for expected in [StatusCode::CREATED, StatusCode::CONFLICT] {
            let req = test::TestRequest::post()
                .uri("/api/letters")
                .cookie(cookie.clone())
                .set_json(json!({
                    "letter_number": 7,
                    "title": "Number seven",
                    "content": "<p>seven</p>",
                    "notify_subscribers": false
                }))
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), expected);
        }
    }

    #[actix_web::test]
    async fn only_owners_edit_or_delete_letters() {
        let pool = memory_pool();
        let letter_id = {
            let conn = pool.get().unwrap();
            let owner = seed_user(&conn, "owner@example.com", Role::Author);
            seed_user(&conn, "other@example.com", Role::Author);
            crate::models::db_operations::letters_db_operations::create_letter(
                &conn,
                &crate::test_support::letter_draft("kept"),
                owner.id,
            )
            .unwrap()
            .id
        };
        let app = test::init_service(test_app(pool.clone())).await;
        let other = login_cookie!(app, "other@example.com");
        let uri = format!("/api/letters/{}", letter_id);

        let req = test::TestRequest::put()
            .uri(&uri)
            .cookie(other.clone())
            .set_json(json!({ "title": "Not yours", "content": "<p>x</p>" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
        let req = test::TestRequest::delete().uri(&uri).cookie(other).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        {
            let conn = pool.get().unwrap();
            let letter = crate::models::db_operations::letters_db_operations::read_letter(&conn, &letter_id, true)
                .unwrap()
                .unwrap();
            assert_eq!(letter.title, "Letter kept");
            assert!(!letter.is_deleted);
        }

        let owner = login_cookie!(app, "owner@example.com");
        for expected in [StatusCode::OK, StatusCode::NOT_FOUND] {
            let req = test::TestRequest::delete().uri(&uri).cookie(owner.clone()).to_request();
            assert_eq!(test::call_service(&app, req).await.status(), expected);
        }

        let resp = test::call_service(&app, test::TestRequest::get().uri("/api/letters/kept").cookie(owner.clone()).to_request()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let req = test::TestRequest::get().uri("/api/letters/kept?include_deleted=true").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
        let req = test::TestRequest::get().uri("/api/letters/kept?include_deleted=true").cookie(owner).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::get().uri("/api/letters?include_deleted=true").to_request();
        let anonymous: Value = test::read_body_json(test::call_service(&app, req).await).await;
        assert!(anonymous.as_array().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn untitled_letters_get_a_generic_slug() {
        let pool = memory_pool();
        {
            let conn = pool.get().unwrap();
            seed_user(&conn, "writer@example.com", Role::Author);
        }
        let app = test::init_service(test_app(pool)).await;
        let cookie = login_cookie!(app, "writer@example.com");

        let req = test::TestRequest::post()
            .uri("/api/letters")
            .cookie(cookie)
            .set_json(json!({ "title": "親愛なる友へ", "content": "<p>手紙</p>", "notify_subscribers": false }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let letter: Value = test::read_body_json(resp).await;
        assert_eq!(letter["slug"], "letter");
    }
}
