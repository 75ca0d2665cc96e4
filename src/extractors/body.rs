//! JSON body extractor that rejects with the crate's error envelope.

use crate::error::AppError;
use async_trait::async_trait;
use axum::{
    extract::{FromRequest, Request},
    Json,
};
use serde_json::Value;

/// Request body as JSON. An absent body reads as `null`.
#[derive(Clone, Debug, Default)]
pub struct JsonBody(pub Value);

#[async_trait]
impl<S> FromRequest<S> for JsonBody
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let empty = req
            .headers()
            .get(axum::http::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .map_or(false, |v| v.trim() == "0");
        if empty || !req.headers().contains_key(axum::http::header::CONTENT_TYPE) {
            return Ok(JsonBody(Value::Null));
        }
        let Json(value) = Json::<Value>::from_request(req, state).await?;
        Ok(JsonBody(value))
    }
}
