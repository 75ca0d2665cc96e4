mod common;

use axum::{
    extract::Request,
    http::{Method, StatusCode},
    middleware::Next,
};
use common::{encode, get, post, send, Call, Recording};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use storefront_gateway::entities::content;
use storefront_gateway::{MethodName, Middleware, NormalizedQuery, RepositoryRef, RouteConfig, RouteRegistry};

fn todo_router(cfg: impl FnOnce(RouteConfig) -> RouteConfig) -> (std::sync::Arc<Recording>, axum::Router) {
    let rec = Recording::new(content::todo());
    let repo: RepositoryRef = rec.clone();
    let router = RouteRegistry::new()
        .register(cfg(RouteConfig::new("/todo").repository(repo)))
        .mount_strict()
        .unwrap();
    (rec, router)
}

#[test]
fn every_method_is_mounted_by_default() {
    let rec = Recording::new(content::todo());
    let repo: RepositoryRef = rec.clone();
    let routes = RouteRegistry::new()
        .register(RouteConfig::new("/todo").repository(repo))
        .routes();
    let expected = vec![
        (Method::GET, "/todo"),
        (Method::GET, "/todo/find"),
        (Method::GET, "/todo/find-one"),
        (Method::POST, "/todo"),
        (Method::POST, "/todo/bulk-create"),
        (Method::PUT, "/todo"),
        (Method::PUT, "/todo/:id"),
        (Method::DELETE, "/todo"),
        (Method::DELETE, "/todo/:id"),
        (Method::GET, "/todo/schema"),
    ];
    let got: Vec<_> = routes.iter().map(|(m, p)| (m.clone(), p.as_str())).collect();
    assert_eq!(got, expected);
}

#[tokio::test]
async fn disabled_methods_are_not_found() {
    let (_rec, router) = todo_router(|c| c.methods(&[MethodName::List, MethodName::Create]));
    assert_eq!(get(&router, "/todo").await.0, StatusCode::OK);
    assert_eq!(get(&router, "/todo/find").await.0, StatusCode::NOT_FOUND);
    let (status, body) = send(&router, Method::DELETE, "/todo/abc", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["statusCode"], 404);
}

#[tokio::test]
async fn read_query_arrives_parsed() {
    let (rec, router) = todo_router(|c| c);
    let uri = format!("/todo?query={}&page=2", encode(&json!({"code": "X"})));
    let (status, body) = get(&router, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["page"], 2);
    assert_eq!(rec.calls(), vec![Call::List(json!({"code": "X"}))]);
}

#[tokio::test]
async fn find_query_arrives_parsed() {
    let (rec, router) = todo_router(|c| c);
    let uri = format!("/todo/find?query={}", encode(&json!({"code": "X"})));
    let (status, body) = get(&router, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_array());
    assert_eq!(rec.calls(), vec![Call::Find(json!({"code": "X"}))]);
}

#[tokio::test]
async fn method_middleware_sees_the_normalized_query() {
    let seen: Arc<Mutex<Vec<Value>>> = Arc::default();
    let log = seen.clone();
    let inspect = Middleware::from_fn(move |req: Request, next: Next| {
        let log = log.clone();
        async move {
            if let Some(NormalizedQuery(map)) = req.extensions().get::<NormalizedQuery>() {
                log.lock().unwrap().push(map.get("query").cloned().unwrap_or(Value::Null));
            }
            next.run(req).await
        }
    });
    let (_rec, router) = todo_router(|c| c.method_middleware(MethodName::List, inspect));
    let uri = format!("/todo?query={}", encode(&json!({"code": "X"})));
    assert_eq!(get(&router, &uri).await.0, StatusCode::OK);
    assert_eq!(get(&router, "/todo/find").await.0, StatusCode::OK);
    assert_eq!(*seen.lock().unwrap(), vec![json!({"code": "X"})]);
}

#[tokio::test]
async fn page_beyond_range_is_a_bad_request() {
    let (rec, router) = todo_router(|c| c);
    let (status, body) = get(&router, &format!("/todo?page={}", u64::MAX)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["statusCode"], 400);
    let (status, _) = get(&router, &format!("/todo/find?page={}&pageSize=2", u64::MAX)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(rec.count(|c| matches!(c, Call::List(_) | Call::Find(_))), 2);
}

#[tokio::test]
async fn invalid_create_never_reaches_the_store() {
    let (rec, router) = todo_router(|c| c);
    let (status, body) = post(&router, "/todo", json!({"data": {"title": "no content"}})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATOR_ERROR");
    assert_eq!(body["error"]["statusCode"], 422);
    assert!(body["message"].as_str().unwrap().contains("content"));
    assert_eq!(rec.count(|c| matches!(c, Call::Create(_))), 0);
}

#[tokio::test]
async fn bulk_create_is_all_or_nothing() {
    let (rec, router) = todo_router(|c| c);
    let valid = json!({"title": "a", "content": "b"});
    let (status, body) = post(
        &router,
        "/todo/bulk-create",
        json!({"data": [valid.clone(), {"title": "missing content"}, valid.clone()]}),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["index"], 1);
    assert_eq!(rec.count(|c| matches!(c, Call::CreateMany(_))), 0);

    let (status, body) = post(&router, "/todo/bulk-create", json!({"data": [valid.clone(), valid]})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body.as_array().unwrap().len(), 2);
    assert_eq!(rec.count(|c| matches!(c, Call::CreateMany(_))), 1);

    let (status, body) = post(&router, "/todo/bulk-create", json!({"data": {"title": "x"}})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["message"], "data must be array");
}

#[tokio::test]
async fn update_one_uses_the_path_id() {
    let (rec, router) = todo_router(|c| c);
    let (_, first) = post(&router, "/todo", json!({"data": {"title": "one", "content": "c"}})).await;
    let (_, second) = post(&router, "/todo", json!({"data": {"title": "two", "content": "c"}})).await;
    let id = first["id"].as_str().unwrap();
    let (status, body) = send(
        &router,
        Method::PUT,
        &format!("/todo/{}", id),
        Some(json!({"query": {"id": second["id"]}, "data": {"title": "renamed"}})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], first["id"]);
    assert_eq!(body["title"], "renamed");
    let last = rec.calls().into_iter().rev().find(|c| matches!(c, Call::UpdateOne(_))).unwrap();
    let Call::UpdateOne(payload) = last else { unreachable!() };
    assert_eq!(payload["query"]["id"], first["id"]);

    let (status, _) = send(
        &router,
        Method::PUT,
        &format!("/todo/{}", id),
        Some(json!({"query": {"status": "open"}, "data": {"title": "again"}})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let last = rec.calls().into_iter().rev().find(|c| matches!(c, Call::UpdateOne(_))).unwrap();
    let Call::UpdateOne(payload) = last else { unreachable!() };
    assert_eq!(payload["query"], json!({"status": "open", "id": first["id"]}));

    let (status, body) = send(
        &router,
        Method::PUT,
        "/todo/missing",
        Some(json!({"data": {"title": "x"}})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_null());
}

#[tokio::test]
async fn schema_describes_fields_without_touching_the_store() {
    let (rec, router) = todo_router(|c| c);
    let (status, body) = get(&router, "/todo/schema").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("title").is_some());
    assert!(body.get("comments").is_some());
    assert!(rec.calls().is_empty());
}

#[tokio::test]
async fn created_documents_read_back() {
    let (_rec, router) = todo_router(|c| c);
    let (status, created) = post(&router, "/todo", json!({"data": {"title": "t", "content": "c"}})).await;
    assert_eq!(status, StatusCode::CREATED);
    let uri = format!("/todo/find-one?query={}", encode(&json!({"id": created["id"]})));
    let (status, found) = get(&router, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found["title"], "t");

    let (status, deleted) = send(
        &router,
        Method::DELETE,
        &format!("/todo/{}", created["id"].as_str().unwrap()),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["deletedCount"], 1);
    let (_, found) = get(&router, &uri).await;
    assert!(found.is_null());
}
