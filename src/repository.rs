//! Repository capability consumed by the route binders.

use crate::context::RequestMeta;
use crate::error::{AppError, FieldError};
use crate::query::QueryContext;
use crate::schema::EntitySchema;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, Weak};

/// Repository operation names; hooks are keyed by these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    Find,
    FindOne,
    Create,
    CreateMany,
    Update,
    UpdateOne,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::Find => "find",
            Operation::FindOne => "findOne",
            Operation::Create => "create",
            Operation::CreateMany => "createMany",
            Operation::Update => "update",
            Operation::UpdateOne => "updateOne",
            Operation::Delete => "delete",
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self, Operation::List | Operation::Find | Operation::FindOne)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a write: `{data, query, populates}` plus the request meta.
#[derive(Clone, Debug, Default)]
pub struct WriteRequest {
    pub data: Value,
    pub query: Map<String, Value>,
    pub populates: Vec<Value>,
    pub soft_delete: bool,
    pub meta: RequestMeta,
}

impl WriteRequest {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }

    pub fn filter(query: Map<String, Value>) -> Self {
        Self {
            query,
            ..Default::default()
        }
    }

    /// Splits a JSON request body into its `data`, `query` and `populates` parts.
    pub fn from_body(body: Value, meta: RequestMeta) -> Result<Self, AppError> {
        let mut body = match body {
            Value::Object(m) => m,
            Value::Null => Map::new(),
            _ => return Err(AppError::bad_request("request body must be a JSON object")),
        };
        let data = body.remove("data").unwrap_or(Value::Null);
        let query = match body.remove("query") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(q)) => q,
            Some(_) => return Err(AppError::bad_request("query must be a JSON object")),
        };
        let populates = match body.remove("populates") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(p)) => p,
            Some(other) => vec![other],
        };
        let soft_delete = body
            .remove("softDelete")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        Ok(Self {
            data,
            query,
            populates,
            soft_delete,
            meta,
        })
    }

    pub fn with_query(mut self, query: Map<String, Value>) -> Self {
        self.query = query;
        self
    }

    pub fn with_populates(mut self, populates: Vec<Value>) -> Self {
        self.populates = populates;
        self
    }

    pub fn with_meta(mut self, meta: RequestMeta) -> Self {
        self.meta = meta;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationMode {
    /// Whole entity: required fields are enforced.
    Full,
    /// Update payload: only present fields are checked.
    Partial,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<FieldError>,
}

impl ValidationResult {
    pub fn from_errors(errors: Vec<FieldError>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    pub fn ok() -> Self {
        Self::from_errors(Vec::new())
    }

    pub fn into_result(self) -> Result<(), AppError> {
        if self.valid {
            Ok(())
        } else {
            Err(AppError::validation(self.errors))
        }
    }
}

/// Paginated result of `list`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub data: Vec<Value>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub total_pages: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub deleted_count: u64,
}

/// Data-access capability bound to one entity type.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Human-readable identifier used in logs.
    fn name(&self) -> &str;

    fn schema(&self) -> &EntitySchema;

    async fn validate_entity(
        &self,
        data: &Value,
        mode: ValidationMode,
    ) -> Result<ValidationResult, AppError>;

    async fn list(&self, ctx: QueryContext) -> Result<Page, AppError>;

    async fn find(&self, ctx: QueryContext) -> Result<Vec<Value>, AppError>;

    async fn find_one(&self, ctx: QueryContext) -> Result<Option<Value>, AppError>;

    async fn create(&self, req: WriteRequest) -> Result<Value, AppError>;

    async fn create_many(&self, req: WriteRequest) -> Result<Vec<Value>, AppError>;

    async fn update(&self, req: WriteRequest) -> Result<Vec<Value>, AppError>;

    async fn update_one(&self, req: WriteRequest) -> Result<Option<Value>, AppError>;

    async fn delete(&self, req: WriteRequest) -> Result<DeleteResult, AppError>;
}

pub type RepositoryRef = Arc<dyn Repository>;

/// Repositories by entity name, used to resolve references during population.
/// Holds weak handles so repositories can reach each other without cycles.
#[derive(Clone, Default)]
pub struct Catalog {
    inner: Arc<RwLock<HashMap<String, Weak<dyn Repository>>>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, repo: &RepositoryRef) -> Result<(), AppError> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| AppError::internal("catalog lock poisoned"))?;
        map.insert(repo.schema().name.clone(), Arc::downgrade(repo));
        Ok(())
    }

    pub fn get(&self, entity: &str) -> Result<RepositoryRef, AppError> {
        let map = self
            .inner
            .read()
            .map_err(|_| AppError::internal("catalog lock poisoned"))?;
        map.get(entity)
            .and_then(Weak::upgrade)
            .ok_or_else(|| AppError::internal(format!("no repository registered for {}", entity)))
    }
}

/// Id of a reference that may be either a raw id or a populated document.
pub fn object_id(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(m) => m.get("id").and_then(object_id),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_body_splits_parts() {
        let req = WriteRequest::from_body(
            json!({"data": {"a": 1}, "query": {"b": 2}, "populates": ["roles"]}),
            RequestMeta::anonymous(),
        )
        .unwrap();
        assert_eq!(req.data, json!({"a": 1}));
        assert_eq!(req.query.get("b"), Some(&json!(2)));
        assert_eq!(req.populates, vec![json!("roles")]);
    }

    #[test]
    fn from_body_rejects_non_object_query() {
        let err = WriteRequest::from_body(json!({"query": "x"}), RequestMeta::anonymous()).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn object_id_accepts_populated_documents() {
        assert_eq!(object_id(&json!("abc")), Some("abc".into()));
        assert_eq!(object_id(&json!({"id": "abc", "name": "x"})), Some("abc".into()));
        assert_eq!(object_id(&json!(null)), None);
    }
}
