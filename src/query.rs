//! Query-string normalization and the read context handed to repositories.

use crate::context::RequestMeta;
use crate::error::AppError;
use crate::routes::middleware::Middleware;
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Query, Request},
    http::{request::Parts, Uri},
    middleware::Next,
    response::Response,
};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// Keys whose string values are decoded as JSON.
pub const JSON_KEYS: [&str; 7] = [
    "query",
    "populates",
    "page",
    "pageSize",
    "projection",
    "softDelete",
    "select",
];

/// Query-string parameters after JSON decoding of the recognized keys.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NormalizedQuery(pub Map<String, Value>);

impl NormalizedQuery {
    /// Recognized keys holding valid JSON are replaced by the decoded value;
    /// everything else (including malformed JSON) stays a string.
    pub fn from_pairs(params: HashMap<String, String>) -> Self {
        let map = params
            .into_iter()
            .map(|(k, raw)| {
                let v = if JSON_KEYS.contains(&k.as_str()) {
                    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
                } else {
                    Value::String(raw)
                };
                (k, v)
            })
            .collect();
        NormalizedQuery(map)
    }

    pub fn from_uri(uri: &Uri) -> Self {
        match Query::<HashMap<String, String>>::try_from_uri(uri) {
            Ok(Query(params)) => Self::from_pairs(params),
            Err(e) => {
                tracing::debug!(error = %e, "unparseable query string");
                Self::default()
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

/// Middleware form of the normalizer; stores [`NormalizedQuery`] in the request extensions.
pub async fn normalize_request(mut req: Request, next: Next) -> Response {
    let normalized = NormalizedQuery::from_uri(req.uri());
    req.extensions_mut().insert(normalized);
    next.run(req).await
}

pub fn query_normalizer() -> Middleware {
    Middleware::from_fn(normalize_request)
}

#[async_trait]
impl<S> FromRequestParts<S> for NormalizedQuery
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(q) = parts.extensions.get::<NormalizedQuery>() {
            return Ok(q.clone());
        }
        Ok(NormalizedQuery::from_uri(&parts.uri))
    }
}

/// Everything a read operation needs: filter, paging, shaping and the request meta.
#[derive(Clone, Debug, Default)]
pub struct QueryContext {
    pub query: Map<String, Value>,
    pub populates: Vec<Value>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub projection: Option<Value>,
    pub select: Option<Value>,
    /// Include soft-deleted documents.
    pub soft_delete: bool,
    pub sort: Option<String>,
    pub meta: RequestMeta,
}

impl QueryContext {
    pub fn new(query: Map<String, Value>) -> Self {
        Self {
            query,
            ..Default::default()
        }
    }

    pub fn by_id(id: &str) -> Self {
        let mut query = Map::new();
        query.insert("id".into(), json!(id));
        Self::new(query)
    }

    pub fn with_populates(mut self, populates: Vec<Value>) -> Self {
        self.populates = populates;
        self
    }

    pub fn with_meta(mut self, meta: RequestMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Builds a context from normalized parameters. Values left as strings by the
    /// normalizer are coerced where unambiguous and rejected otherwise.
    pub fn from_normalized(q: &NormalizedQuery, meta: RequestMeta) -> Result<Self, AppError> {
        let mut query = match q.get("query") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(m)) => m.clone(),
            Some(_) => return Err(AppError::bad_request("query must be a JSON object")),
        };
        if let Some(term) = q.get("search").and_then(Value::as_str).map(str::trim) {
            if !term.is_empty() {
                let exact = q
                    .get("exact")
                    .and_then(Value::as_str)
                    .map_or(false, |s| !matches!(s, "false" | "0"));
                let search = if exact {
                    format!("\"{}\"", term)
                } else {
                    term.to_string()
                };
                query.insert("$text".into(), json!({ "$search": search }));
            }
        }
        let populates = match q.get("populates") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| json!(s))
                .collect(),
            Some(other @ Value::Object(_)) => vec![other.clone()],
            Some(_) => return Err(AppError::bad_request("populates must be an array")),
        };
        let soft_delete = match q.get("softDelete") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(_) => return Err(AppError::bad_request("softDelete must be a boolean")),
        };
        let projection = match q.get("projection") {
            None | Some(Value::Null) => None,
            Some(v @ Value::Object(_)) => Some(v.clone()),
            Some(_) => return Err(AppError::bad_request("projection must be a JSON object")),
        };
        Ok(QueryContext {
            query,
            populates,
            page: positive_int(q.get("page"), "page")?,
            page_size: positive_int(q.get("pageSize"), "pageSize")?,
            projection,
            select: q.get("select").filter(|v| !v.is_null()).cloned(),
            soft_delete,
            sort: q.get("sort").and_then(Value::as_str).map(String::from),
            meta,
        })
    }
}

fn positive_int(v: Option<&Value>, key: &str) -> Result<Option<u64>, AppError> {
    let n = match v {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        Some(_) => None,
    };
    match n {
        Some(n) if n > 0 => Ok(Some(n)),
        _ => Err(AppError::bad_request(format!("{} must be a positive integer", key))),
    }
}
