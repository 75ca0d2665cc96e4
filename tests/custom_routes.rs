mod common;

use axum::{extract::Request, http::StatusCode, middleware::Next};
use common::{get, Recording};
use std::sync::{Arc, Mutex};
use storefront_gateway::entities::content;
use storefront_gateway::{CustomRoute, Endpoint, Middleware, RepositoryRef, RouteConfig, RouteRegistry};

fn done() -> CustomRoute {
    CustomRoute::new(Endpoint::new(|| async { "done" }))
}

fn tracer(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Middleware {
    let log = log.clone();
    Middleware::from_fn(move |req: Request, next: Next| {
        let log = log.clone();
        async move {
            log.lock().unwrap().push(name);
            next.run(req).await
        }
    })
}

#[tokio::test]
async fn custom_route_sits_beside_crud_routes() {
    let rec = Recording::new(content::todo());
    let repo: RepositoryRef = rec.clone();
    let router = RouteRegistry::new()
        .register(RouteConfig::new("/todo").repository(repo).custom("GET /make-done", done()))
        .mount_strict()
        .unwrap();
    let (status, body) = get(&router, "/todo/make-done").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "done");
    assert_eq!(get(&router, "/todo").await.0, StatusCode::OK);
}

#[tokio::test]
async fn unknown_verbs_and_empty_handlers_are_skipped() {
    let router = RouteRegistry::new()
        .register(
            RouteConfig::new("/misc")
                .custom("FOO /x", done())
                .custom("GET /empty", CustomRoute::empty())
                .custom("get /ok", done()),
        )
        .mount();
    assert_eq!(get(&router, "/misc/x").await.0, StatusCode::NOT_FOUND);
    assert_eq!(get(&router, "/misc/empty").await.0, StatusCode::NOT_FOUND);
    assert_eq!(get(&router, "/misc/ok").await.0, StatusCode::OK);
}

#[tokio::test]
async fn middleware_runs_in_declared_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let router = RouteRegistry::new()
        .register(
            RouteConfig::new("/chain")
                .middleware(tracer(&log, "global"))
                .custom(
                    "GET /",
                    done().before(tracer(&log, "first")).before(tracer(&log, "second")),
                ),
        )
        .mount_strict()
        .unwrap();
    assert_eq!(get(&router, "/chain").await.0, StatusCode::OK);
    assert_eq!(*log.lock().unwrap(), vec!["global", "first", "second"]);
}

#[tokio::test]
async fn middleware_can_short_circuit() {
    let deny = Middleware::from_fn(|_req: Request, _next: Next| async { (StatusCode::FORBIDDEN, "no") });
    let router = RouteRegistry::new()
        .register(RouteConfig::new("/locked").custom("GET /", done().before(deny)))
        .mount_strict()
        .unwrap();
    let (status, body) = get(&router, "/locked").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, "no");
}
