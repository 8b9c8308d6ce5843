use actix_session::{Session, SessionExt};
use actix_web::{
    body::EitherBody,
    dev::{self, forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    middleware::DefaultHeaders,
    web, Error, FromRequest, HttpRequest, HttpResponse,
};
use chrono::{DateTime, Utc};
use futures_util::future::{ok, LocalBoxFuture, Ready};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready as StdReady};

use crate::error::ApiError;
use crate::models::db_operations::{get_conn, users_db_operations};
use crate::models::{Role, User};
use crate::DbPool;

pub const SESSION_USER_KEY: &str = "user";
pub const SESSION_TTL_DAYS: i64 = 7;
pub const LOGIN_PAGE: &str = "/admin/login";

/// What the session cookie carries for a logged-in user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: i32,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub issued_at: DateTime<Utc>,
}

impl SessionUser {
    pub fn new(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
            issued_at: Utc::now(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.issued_at > chrono::Duration::days(SESSION_TTL_DAYS)
    }
}

/// Reads the session user, dropping it when it is older than the session TTL.
pub fn current_session_user(session: &Session) -> Option<SessionUser> {
    let user = session.get::<SessionUser>(SESSION_USER_KEY).unwrap_or(None)?;
    if user.is_expired(Utc::now()) {
        session.purge();
        return None;
    }
    Some(user)
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthenticatedUser {
    pub id: i32,
    pub email: String,
    pub name: String,
    pub role: Role,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Admin role required.".to_string()))
        }
    }

    /// Admins may modify anything; authors only rows they created.
    pub fn can_modify(&self, owner: Option<i32>) -> bool {
        self.is_admin() || owner == Some(self.id)
    }

    pub fn require_owner(&self, owner: Option<i32>) -> Result<(), ApiError> {
        if self.can_modify(owner) {
            Ok(())
        } else {
            Err(ApiError::Forbidden("You can only modify content you created.".to_string()))
        }
    }
}

impl From<User> for AuthenticatedUser {
    fn from(user: User) -> Self {
        Self { id: user.id, email: user.email, name: user.name, role: user.role }
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = ApiError;
    type Future = StdReady<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut dev::Payload) -> Self::Future {
        let session = req.get_session();
        let Some(session_user) = current_session_user(&session) else {
            return ready(Err(ApiError::Unauthorized("Not logged in.".to_string())));
        };
        let Some(pool) = req.app_data::<web::Data<DbPool>>() else {
            log::error!("Database pool missing from app data; cannot check session user.");
            return ready(Err(ApiError::Internal));
        };
        ready(refresh_account(pool, session_user).map_err(|err| {
            if matches!(err, ApiError::Unauthorized(_)) {
                session.purge();
            }
            err
        }))
    }
}

/// Re-reads the account behind a session. Deleted or deactivated accounts are
/// rejected and the current role and name come from the row.
fn refresh_account(pool: &DbPool, session_user: SessionUser) -> Result<AuthenticatedUser, ApiError> {
    let conn = get_conn(pool)?;
    match users_db_operations::read_user_by_id(&conn, session_user.id)? {
        Some(user) if user.is_active => Ok(user.into()),
        Some(_) => {
            log::warn!("Rejecting session for deactivated user {}.", session_user.email);
            Err(ApiError::Unauthorized("Account is no longer active.".to_string()))
        }
        None => {
            log::warn!("Rejecting session for deleted user {}.", session_user.email);
            Err(ApiError::Unauthorized("Account is no longer active.".to_string()))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteAccess {
    Allow,
    RedirectToLogin,
}

/// Admin pages need a session. The login page itself and everything else
/// (including the JSON API, which answers 401 on its own) pass through.
pub fn route_access(path: &str, authenticated: bool) -> RouteAccess {
    let is_admin_page = path == "/admin" || path.starts_with("/admin/");
    let is_login_page = path == LOGIN_PAGE || path.starts_with("/admin/login/");
    if is_admin_page && !is_login_page && !authenticated {
        RouteAccess::RedirectToLogin
    } else {
        RouteAccess::Allow
    }
}

pub fn login_redirect_location(path_and_query: &str) -> String {
    let callback: String = url::form_urlencoded::byte_serialize(path_and_query.as_bytes()).collect();
    format!("{}?callbackUrl={}", LOGIN_PAGE, callback)
}

pub fn security_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add(("X-Content-Type-Options", "nosniff"))
        .add(("X-Frame-Options", "DENY"))
        .add(("X-XSS-Protection", "1; mode=block"))
        .add(("Referrer-Policy", "strict-origin-when-cross-origin"))
}

pub struct RouteProtection;

impl<S, B> Transform<S, ServiceRequest> for RouteProtection
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RouteProtectionMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RouteProtectionMiddleware { service })
    }
}

pub struct RouteProtectionMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for RouteProtectionMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let authenticated = current_session_user(&req.get_session()).is_some();

        match route_access(req.path(), authenticated) {
            RouteAccess::Allow => {
                let fut = self.service.call(req);
                Box::pin(async move {
                    let res = fut.await?;
                    Ok(res.map_into_left_body())
                })
            }
            RouteAccess::RedirectToLogin => {
                let target = req
                    .uri()
                    .path_and_query()
                    .map(|pq| pq.as_str().to_string())
                    .unwrap_or_else(|| req.path().to_string());
                log::debug!("Redirecting unauthenticated request for {} to login.", target);
                Box::pin(async move {
                    let (http_req, _payload) = req.into_parts();
                    let res = HttpResponse::Found()
                        .append_header(("location", login_redirect_location(&target)))
                        .finish()
                        .map_into_right_body();
                    Ok(ServiceResponse::new(http_req, res))
                })
            }
        }
    }
}
