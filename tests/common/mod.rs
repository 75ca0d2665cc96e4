#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use storefront_gateway::{
    build_app, AppError, AppState, Catalog, DeleteResult, DocumentRepository, EntitySchema, MemoryStore, Page,
    QueryContext, Repository, RepositoryRef, Settings, ValidationMode, WriteRequest,
};
use storefront_gateway::repository::ValidationResult;
use tower::ServiceExt;

pub const SECRET: &str = "integration-secret";

pub fn state() -> AppState {
    AppState::in_memory(Settings::for_secret(SECRET)).unwrap()
}

pub fn app() -> (AppState, Router) {
    let state = state();
    let router = build_app(&state).unwrap();
    (state, router)
}

pub async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    token: Option<&str>,
) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let req = match body {
        Some(b) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };
    let res = router.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

pub async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
    send(router, Method::GET, uri, None, None).await
}

pub async fn post(router: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(router, Method::POST, uri, Some(body), None).await
}

/// Percent-encodes a JSON value for use as a query parameter.
pub fn encode(v: &Value) -> String {
    v.to_string()
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => (b as char).to_string(),
            _ => format!("%{:02X}", b),
        })
        .collect()
}

/// Runs first-run setup and returns the admin token.
pub async fn init_app(router: &Router) -> String {
    let (status, body) = post(
        router,
        "/auth/init",
        json!({"admin": {"username": "root", "password": "root-pass", "profile": {"name": "Root"}}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    body["token"].as_str().unwrap().to_string()
}

/// Every repository call, with the filter or payload it received.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Validate(Value),
    List(Value),
    Find(Value),
    FindOne(Value),
    Create(Value),
    CreateMany(Value),
    Update(Value),
    UpdateOne(Value),
    Delete(Value),
}

/// Delegates to a real in-memory repository and records each call.
pub struct Recording {
    inner: RepositoryRef,
    pub calls: Mutex<Vec<Call>>,
}

impl Recording {
    pub fn new(schema: EntitySchema) -> Arc<Self> {
        let inner = DocumentRepository::new(schema, Arc::new(MemoryStore::new()), Catalog::new())
            .register()
            .unwrap();
        Arc::new(Self {
            inner,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

fn query_of(ctx: &QueryContext) -> Value {
    Value::Object(ctx.query.clone())
}

fn write_of(req: &WriteRequest) -> Value {
    json!({"data": req.data, "query": req.query})
}

#[async_trait]
impl Repository for Recording {
    fn name(&self) -> &str {
        "RecordingRepository"
    }

    fn schema(&self) -> &EntitySchema {
        self.inner.schema()
    }

    async fn validate_entity(&self, data: &Value, mode: ValidationMode) -> Result<ValidationResult, AppError> {
        self.record(Call::Validate(data.clone()));
        self.inner.validate_entity(data, mode).await
    }

    async fn list(&self, ctx: QueryContext) -> Result<Page, AppError> {
        self.record(Call::List(query_of(&ctx)));
        self.inner.list(ctx).await
    }

    async fn find(&self, ctx: QueryContext) -> Result<Vec<Value>, AppError> {
        self.record(Call::Find(query_of(&ctx)));
        self.inner.find(ctx).await
    }

    async fn find_one(&self, ctx: QueryContext) -> Result<Option<Value>, AppError> {
        self.record(Call::FindOne(query_of(&ctx)));
        self.inner.find_one(ctx).await
    }

    async fn create(&self, req: WriteRequest) -> Result<Value, AppError> {
        self.record(Call::Create(write_of(&req)));
        self.inner.create(req).await
    }

    async fn create_many(&self, req: WriteRequest) -> Result<Vec<Value>, AppError> {
        self.record(Call::CreateMany(write_of(&req)));
        self.inner.create_many(req).await
    }

    async fn update(&self, req: WriteRequest) -> Result<Vec<Value>, AppError> {
        self.record(Call::Update(write_of(&req)));
        self.inner.update(req).await
    }

    async fn update_one(&self, req: WriteRequest) -> Result<Option<Value>, AppError> {
        self.record(Call::UpdateOne(write_of(&req)));
        self.inner.update_one(req).await
    }

    async fn delete(&self, req: WriteRequest) -> Result<DeleteResult, AppError> {
        self.record(Call::Delete(write_of(&req)));
        self.inner.delete(req).await
    }
}
