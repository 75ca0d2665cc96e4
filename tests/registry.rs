mod common;

use axum::http::{Method, StatusCode};
use common::{get, Recording};
use storefront_gateway::entities::content;
use storefront_gateway::{
    ConfigError, CustomRoute, Endpoint, MethodName, RepositoryRef, RouteConfig, RouteRegistry,
};

fn text(s: &'static str) -> CustomRoute {
    CustomRoute::new(Endpoint::new(move || async move { s }))
}

fn todo_repo() -> (std::sync::Arc<Recording>, RepositoryRef) {
    let rec = Recording::new(content::todo());
    let repo: RepositoryRef = rec.clone();
    (rec, repo)
}

#[tokio::test]
async fn crud_route_wins_over_a_colliding_custom_route() {
    let (rec, repo) = todo_repo();
    let registry = RouteRegistry::new()
        .register(RouteConfig::new("/todo").repository(repo).custom("GET /schema", text("custom")));
    let router = registry.mount();
    let (status, body) = get(&router, "/todo/schema").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("title").is_some());
    assert!(rec.calls().is_empty());

    match registry.mount_strict() {
        Err(ConfigError::Rejected(issues)) => {
            assert!(issues.iter().any(|i| matches!(i, ConfigError::DuplicateRoute { .. })))
        }
        other => panic!("expected rejection, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn disabling_a_method_frees_its_path() {
    let (_rec, repo) = todo_repo();
    let router = RouteRegistry::new()
        .register(
            RouteConfig::new("/todo")
                .repository(repo)
                .disable(MethodName::Schema)
                .custom("GET /schema", text("custom")),
        )
        .mount_strict()
        .unwrap();
    let (status, body) = get(&router, "/todo/schema").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "custom");
}

#[tokio::test]
async fn descriptors_can_share_a_prefix() {
    let (rec, repo) = todo_repo();
    let registry = RouteRegistry::new()
        .register(RouteConfig::new("/todo").repository(repo))
        .register(RouteConfig::new("/todo").custom("GET /x", text("x")))
        .register(RouteConfig::new("/todo/").custom("GET /y", text("y")));
    let router = registry.mount_strict().unwrap();

    let (status, body) = get(&router, "/todo/x").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "x");
    let (status, body) = get(&router, "/todo/y").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "y");
    let (status, _) = get(&router, "/todo").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rec.count(|c| matches!(c, common::Call::List(_))), 1);
}

#[tokio::test]
async fn first_descriptor_wins_a_colliding_route() {
    let registry = RouteRegistry::new()
        .register(RouteConfig::new("/dup").custom("GET /", text("first")))
        .register(RouteConfig::new("/dup").custom("GET /", text("second")));
    let (status, body) = get(&registry.mount(), "/dup").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "first");
    assert!(registry.mount_strict().is_err());
}

#[test]
fn strict_mount_lists_every_problem() {
    let registry = RouteRegistry::new()
        .register(RouteConfig::new("nope").custom("GET /", text("x")))
        .register(
            RouteConfig::new("/bad")
                .custom("FOO /x", text("x"))
                .custom("CONNECT /tunnel", text("x"))
                .custom("GET /empty", CustomRoute::empty()),
        )
        .register(RouteConfig::new("/nothing"));
    let Err(ConfigError::Rejected(issues)) = registry.validate() else {
        panic!("expected rejection");
    };
    assert!(issues.len() >= 5, "{:?}", issues);
    assert_eq!(
        registry.routes(),
        Vec::<(Method, String)>::new(),
        "lenient mount binds nothing from these descriptors"
    );
}
