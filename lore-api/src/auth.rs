//! Identity boundary. Authentication itself happens in the upstream
//! gateway, which injects the caller's id as a header; this extractor is
//! the only place that reads it.

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::routes::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value).ok())
            .map(|user_id| AuthUser { user_id })
            .ok_or_else(|| ApiError::unauthorized("missing or invalid caller identity"))
    }
}
