use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiError;
use crate::helper::email_helpers::Recipient;
use crate::helper::validation_helpers::{is_valid_email, normalize_email};
use crate::middleware::AuthenticatedUser;
use crate::models::db_operations::subscribers_db_operations::{self, SubscribeOutcome, UnsubscribeOutcome};
use crate::models::db_operations::get_conn;
use crate::{AppState, DbPool};

#[derive(Deserialize)]
pub struct SubscribeRequest {
    email: String,
}

#[derive(Deserialize)]
pub struct UnsubscribeRequest {
    token: String,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/subscribers", web::post().to(subscribe))
        .route("/subscribers", web::get().to(list_subscribers))
        .route("/subscribers/unsubscribe", web::post().to(unsubscribe))
        .route("/subscribers/{id}", web::delete().to(delete_subscriber));
}

async fn subscribe(
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    body: web::Json<SubscribeRequest>,
) -> Result<HttpResponse, ApiError> {
    let email = normalize_email(&body.email);
    if !is_valid_email(&email) {
        return Err(ApiError::BadRequest("Please provide a valid email address.".to_string()));
    }

    let conn = get_conn(&pool)?;
    let outcome = subscribers_db_operations::subscribe(&conn, &email)?;
    let subscriber = outcome.subscriber();

    if let Some(newsletter) = state.newsletter.as_ref() {
        newsletter.spawn_welcome(
            state.site_url.clone(),
            Recipient { email: subscriber.email.clone(), unsubscribe_token: subscriber.unsubscribe_token.clone() },
        );
    }

    let response = match &outcome {
        SubscribeOutcome::Created(s) => {
            log::info!("New subscriber {}.", s.id);
            HttpResponse::Created().json(json!({ "message": "Subscribed.", "subscriber": s }))
        }
        SubscribeOutcome::Reactivated(s) => {
            log::info!("Subscriber {} resubscribed.", s.id);
            HttpResponse::Ok().json(json!({ "message": "Welcome back! Your subscription is active again.", "subscriber": s }))
        }
    };
    Ok(response)
}

async fn unsubscribe(pool: web::Data<DbPool>, body: web::Json<UnsubscribeRequest>) -> Result<HttpResponse, ApiError> {
    let token = body.token.trim();
    if token.is_empty() {
        return Err(ApiError::BadRequest("An unsubscribe token is required.".to_string()));
    }

    let conn = get_conn(&pool)?;
    let message = match subscribers_db_operations::unsubscribe(&conn, token)? {
        UnsubscribeOutcome::Unsubscribed => "You have been unsubscribed.",
        UnsubscribeOutcome::AlreadyUnsubscribed => "You are already unsubscribed.",
    };
    Ok(HttpResponse::Ok().json(json!({ "message": message })))
}

async fn list_subscribers(pool: web::Data<DbPool>, user: AuthenticatedUser) -> Result<HttpResponse, ApiError> {
    user.require_admin()?;
    let conn = get_conn(&pool)?;
    let subscribers = subscribers_db_operations::list_subscribers(&conn)?;
    let active_count = subscribers.iter().filter(|s| s.is_active).count();
    Ok(HttpResponse::Ok().json(json!({ "subscribers": subscribers, "active_count": active_count })))
}

async fn delete_subscriber(
    pool: web::Data<DbPool>,
    id: web::Path<i64>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, ApiError> {
    user.require_admin()?;
    let id = id.into_inner();
    let conn = get_conn(&pool)?;
    if subscribers_db_operations::delete_subscriber(&conn, id)? == 0 {
        return Err(ApiError::NotFound("Subscriber not found.".to_string()));
    }
    log::info!("User {} deleted subscriber {}.", user.email, id);
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::test_support::{login_cookie, memory_pool, seed_user, test_app};
    use actix_web::{http::StatusCode, test};
    use serde_json::Value;

    #[actix_web::test]
    async fn subscribe_conflict_and_reactivation() {
        let pool = memory_pool();
        let app = test::init_service(test_app(pool.clone())).await;

        let subscribe = |email: &str| {
            test::TestRequest::post().uri("/api/subscribers").set_json(json!({ "email": email })).to_request()
        };

        let resp = test::call_service(&app, subscribe("Reader@Example.com")).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let first: Value = test::read_body_json(resp).await;
        assert!(first["subscriber"].get("unsubscribe_token").is_none());

        let resp = test::call_service(&app, subscribe("reader@example.com")).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = test::call_service(&app, subscribe("not-an-email")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let token = {
            let conn = pool.get().unwrap();
            subscribers_db_operations::read_subscriber_by_email(&conn, "reader@example.com")
                .unwrap()
                .unwrap()
                .unsubscribe_token
        };

        for expected in ["You have been unsubscribed.", "You are already unsubscribed."] {
            let req = test::TestRequest::post()
                .uri("/api/subscribers/unsubscribe")
                .set_json(json!({ "token": token }))
                .to_request();
            let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
            assert_eq!(body["message"], expected);
        }

        let resp = test::call_service(&app, subscribe("reader@example.com")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let again: Value = test::read_body_json(resp).await;
        assert_eq!(again["subscriber"]["id"], first["subscriber"]["id"]);
        assert_eq!(again["subscriber"]["is_active"], true);
    }

    #[actix_web::test]
    async fn unknown_unsubscribe_token_is_not_found() {
        let app = test::init_service(test_app(memory_pool())).await;
        let req = test::TestRequest::post()
            .uri("/api/subscribers/unsubscribe")
            .set_json(json!({ "token": "deadbeef" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn only_admins_manage_subscribers() {
        let pool = memory_pool();
        {
            let conn = pool.get().unwrap();
            seed_user(&conn, "admin@example.com", Role::Admin);
            seed_user(&conn, "author@example.com", Role::Author);
            subscribers_db_operations::subscribe(&conn, "a@example.com").unwrap();
            subscribers_db_operations::subscribe(&conn, "b@example.com").unwrap();
        }
        let app = test::init_service(test_app(pool)).await;

        let author = login_cookie!(app, "author@example.com");
        let req = test::TestRequest::get().uri("/api/subscribers").cookie(author).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let admin = login_cookie!(app, "admin@example.com");
        let req = test::TestRequest::get().uri("/api/subscribers").cookie(admin.clone()).to_request();
        let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
        assert_eq!(body["active_count"], 2);

        let id = body["subscribers"][0]["id"].as_i64().unwrap();
        let req = test::TestRequest::delete().uri(&format!("/api/subscribers/{}", id)).cookie(admin.clone()).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        let req = test::TestRequest::delete().uri(&format!("/api/subscribers/{}", id)).cookie(admin).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }
}
