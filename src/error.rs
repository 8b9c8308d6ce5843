use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use crate::models::db_operations::DbError;

/// Errors surfaced by HTTP handlers. Every variant renders as `{"error": "..."}`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unprocessable(String),
    #[error("An internal error occurred.")]
    Internal,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        if err.is_unique_violation() {
            return ApiError::Conflict("A record with the same unique value already exists.".to_string());
        }
        match err {
            DbError::NotFound(what) => ApiError::NotFound(what),
            DbError::Conflict(msg) => ApiError::Conflict(msg),
            DbError::Invalid(msg) => ApiError::BadRequest(msg),
            other => {
                log::error!("Unhandled database failure: {}", other);
                ApiError::Internal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_status_codes() {
        assert_eq!(ApiError::Conflict("x".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(ApiError::Unprocessable("x".into()).status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(ApiError::Internal.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn db_errors_map_to_api_errors() {
        let err: ApiError = DbError::NotFound("Post not found.".into()).into();
        assert!(matches!(err, ApiError::NotFound(ref m) if m == "Post not found."));

        let err: ApiError = DbError::Invalid("Cannot pin a deleted post.".into()).into();
        assert!(matches!(err, ApiError::BadRequest(_)));

        let err: ApiError = DbError::Rusqlite(rusqlite::Error::InvalidQuery).into();
        assert!(matches!(err, ApiError::Internal));
    }
}
