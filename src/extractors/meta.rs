//! [`RequestMeta`] from request extensions; anonymous when no middleware set one.

use crate::context::RequestMeta;
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

#[async_trait]
impl<S> FromRequestParts<S> for RequestMeta
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<RequestMeta>().cloned().unwrap_or_default())
    }
}
