//! Handlers behind the generated CRUD routes.

use crate::context::RequestMeta;
use crate::error::{AppError, FieldError};
use crate::extractors::JsonBody;
use crate::query::{NormalizedQuery, QueryContext};
use crate::repository::{DeleteResult, Page, ValidationMode, WriteRequest};
use crate::response;
use crate::routes::CrudTarget;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Map, Value};

pub async fn list(
    State(t): State<CrudTarget>,
    meta: RequestMeta,
    q: NormalizedQuery,
) -> Result<Json<Page>, AppError> {
    t.guard(async {
        let ctx = QueryContext::from_normalized(&q, meta)?;
        let mut page = t.repo.list(ctx).await?;
        page.data.iter_mut().for_each(|d| t.redact(d));
        Ok(Json(page))
    })
    .await
}

pub async fn find(
    State(t): State<CrudTarget>,
    meta: RequestMeta,
    q: NormalizedQuery,
) -> Result<Json<Vec<Value>>, AppError> {
    t.guard(async {
        let ctx = QueryContext::from_normalized(&q, meta)?;
        let mut docs = t.repo.find(ctx).await?;
        docs.iter_mut().for_each(|d| t.redact(d));
        Ok(Json(docs))
    })
    .await
}

pub async fn find_one(
    State(t): State<CrudTarget>,
    meta: RequestMeta,
    q: NormalizedQuery,
) -> Result<Json<Option<Value>>, AppError> {
    t.guard(async {
        let ctx = QueryContext::from_normalized(&q, meta)?;
        let mut doc = t.repo.find_one(ctx).await?;
        if let Some(d) = doc.as_mut() {
            t.redact(d);
        }
        Ok(Json(doc))
    })
    .await
}

pub async fn create(
    State(t): State<CrudTarget>,
    meta: RequestMeta,
    JsonBody(body): JsonBody,
) -> Result<(StatusCode, Json<Value>), AppError> {
    t.guard(async {
        let req = WriteRequest::from_body(body, meta)?;
        t.repo
            .validate_entity(&req.data, ValidationMode::Full)
            .await?
            .into_result()?;
        let mut created = t.repo.create(req).await?;
        t.redact(&mut created);
        Ok(response::created(created))
    })
    .await
}

/// Every element is validated, in order, before the single bulk write.
pub async fn bulk_create(
    State(t): State<CrudTarget>,
    meta: RequestMeta,
    JsonBody(body): JsonBody,
) -> Result<(StatusCode, Json<Vec<Value>>), AppError> {
    t.guard(async {
        let req = WriteRequest::from_body(body, meta)?;
        let Value::Array(items) = &req.data else {
            return Err(AppError::validation(vec![FieldError::new("data", "data must be array")]));
        };
        for (i, item) in items.iter().enumerate() {
            t.repo
                .validate_entity(item, ValidationMode::Full)
                .await?
                .into_result()
                .map_err(|e| e.at_index(i))?;
        }
        let mut created = t.repo.create_many(req).await?;
        created.iter_mut().for_each(|d| t.redact(d));
        Ok(response::created(created))
    })
    .await
}

pub async fn update(
    State(t): State<CrudTarget>,
    meta: RequestMeta,
    JsonBody(body): JsonBody,
) -> Result<Json<Vec<Value>>, AppError> {
    t.guard(async {
        let req = WriteRequest::from_body(body, meta)?;
        t.repo
            .validate_entity(&req.data, ValidationMode::Partial)
            .await?
            .into_result()?;
        let mut updated = t.repo.update(req).await?;
        updated.iter_mut().for_each(|d| t.redact(d));
        Ok(Json(updated))
    })
    .await
}

/// The path id overrides any `id` in the body filter.
pub async fn update_one(
    State(t): State<CrudTarget>,
    meta: RequestMeta,
    Path(id): Path<String>,
    JsonBody(body): JsonBody,
) -> Result<Json<Option<Value>>, AppError> {
    t.guard(async {
        let mut req = WriteRequest::from_body(body, meta)?;
        req.query.insert("id".into(), json!(id));
        t.repo
            .validate_entity(&req.data, ValidationMode::Partial)
            .await?
            .into_result()?;
        let mut updated = t.repo.update_one(req).await?;
        if let Some(d) = updated.as_mut() {
            t.redact(d);
        }
        Ok(Json(updated))
    })
    .await
}

/// Filter from the body, or from the `query` URL parameter when the body has none.
fn delete_request(body: Value, q: &NormalizedQuery, meta: RequestMeta) -> Result<WriteRequest, AppError> {
    let mut req = WriteRequest::from_body(body, meta)?;
    if req.query.is_empty() {
        req.query = match q.get("query") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(m)) => m.clone(),
            Some(_) => return Err(AppError::bad_request("query must be a JSON object")),
        };
    }
    if let Some(Value::Bool(true)) = q.get("softDelete") {
        req.soft_delete = true;
    }
    Ok(req)
}

pub async fn delete(
    State(t): State<CrudTarget>,
    meta: RequestMeta,
    q: NormalizedQuery,
    JsonBody(body): JsonBody,
) -> Result<Json<DeleteResult>, AppError> {
    t.guard(async {
        let req = delete_request(body, &q, meta)?;
        Ok(Json(t.repo.delete(req).await?))
    })
    .await
}

pub async fn delete_one(
    State(t): State<CrudTarget>,
    meta: RequestMeta,
    Path(id): Path<String>,
    q: NormalizedQuery,
    JsonBody(body): JsonBody,
) -> Result<Json<DeleteResult>, AppError> {
    t.guard(async {
        let mut req = delete_request(body, &q, meta)?;
        req.query.insert("id".into(), json!(id));
        Ok(Json(t.repo.delete(req).await?))
    })
    .await
}

/// Field metadata for form rendering. Never touches the store.
pub async fn schema(State(t): State<CrudTarget>) -> Json<Map<String, Value>> {
    Json(t.repo.schema().describe())
}
