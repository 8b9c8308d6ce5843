//! Fixtures shared by the unit and handler tests.

use actix_session::storage::CookieSessionStore;
use actix_session::SessionMiddleware;
use actix_web::body::MessageBody;
use actix_web::cookie::Key;
use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{web, App};
use chrono::NaiveDate;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::middleware::{security_headers, RouteProtection};
use crate::models::db_operations::users_db_operations;
use crate::models::{LetterDraft, PostDraft, RichContent, Role, User};
use crate::setup::db_setup;
use crate::{routes, AppState, DbPool};

pub const TEST_PASSWORD: &str = "correct horse battery";

/// A single in-memory connection behind the pool, so every checkout sees the
/// same database.
pub fn memory_pool() -> DbPool {
    let manager = SqliteConnectionManager::memory()
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
    let pool = Pool::builder()
        .max_size(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .build(manager)
        .expect("in-memory pool");
    {
        let mut conn = pool.get().expect("pooled connection");
        db_setup::setup_database(&mut conn).expect("schema");
    }
    pool
}

pub fn seed_user(conn: &Connection, email: &str, role: Role) -> User {
    users_db_operations::create_user(conn, email, "Test User", TEST_PASSWORD, role).expect("seed user")
}

pub fn post_draft(slug: &str) -> PostDraft {
    PostDraft {
        title: format!("Title {}", slug),
        excerpt: "An excerpt.".to_string(),
        content: RichContent::Html("<p>Hello there.</p>".to_string()),
        author: "Test User".to_string(),
        tags: Vec::new(),
        image: None,
        read_time: "1 min read".to_string(),
        slug: slug.to_string(),
        date: NaiveDate::from_ymd_opt(2024, 5, 1).expect("valid date"),
        category: "General".to_string(),
    }
}

pub fn letter_draft(slug: &str) -> LetterDraft {
    LetterDraft {
        letter_number: None,
        title: format!("Letter {}", slug),
        subtitle: None,
        recipient: Some("a friend".to_string()),
        content: RichContent::Html("<p>Dear friend,</p>".to_string()),
        excerpt: "Dear friend".to_string(),
        author: "Test User".to_string(),
        slug: slug.to_string(),
        image: None,
        read_time: "1 min read".to_string(),
        published_date: NaiveDate::from_ymd_opt(2024, 5, 1).expect("valid date"),
        series: None,
        tags: Vec::new(),
    }
}

pub fn app_state() -> web::Data<AppState> {
    web::Data::new(AppState { site_url: "https://blog.example.com".to_string(), newsletter: None })
}

/// The full API with a cookie session, wired the same way as `main`.
pub fn test_app(
    pool: DbPool,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let session = SessionMiddleware::builder(CookieSessionStore::default(), Key::generate())
        .cookie_secure(false)
        .build();

    App::new()
        .app_data(web::Data::new(pool))
        .app_data(app_state())
        .wrap(RouteProtection)
        .wrap(session)
        .wrap(security_headers())
        .configure(routes::config_api)
}

/// Logs in through the API and returns the session cookie.
macro_rules! login_cookie {
    ($app:expr, $email:expr) => {{
        let req = actix_web::test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(serde_json::json!({ "email": $email, "password": $crate::test_support::TEST_PASSWORD }))
            .to_request();
        let resp = actix_web::test::call_service(&$app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::OK, "login failed for {}", $email);
        resp.response().cookies().next().expect("session cookie").into_owned()
    }};
}
pub(crate) use login_cookie;
