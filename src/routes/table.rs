//! Accumulates bound routes; the first registration of a verb and path wins.

use crate::error::AppError;
use axum::{http::Method, routing::MethodRouter, Router};
use std::collections::{HashMap, HashSet};

#[derive(Default)]
pub struct RouteTable {
    paths: Vec<(String, MethodRouter)>,
    by_path: HashMap<String, usize>,
    seen: HashSet<(Method, String)>,
    order: Vec<(Method, String)>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, method: &Method, path: &str) -> bool {
        self.seen.contains(&(method.clone(), path.to_string()))
    }

    /// Adds a single-verb route. Returns `false` (and drops `route`) when the
    /// verb and path are already taken.
    pub fn add(&mut self, method: Method, path: &str, route: MethodRouter) -> bool {
        if !self.seen.insert((method.clone(), path.to_string())) {
            return false;
        }
        self.order.push((method, path.to_string()));
        match self.by_path.get(path) {
            Some(&i) => {
                let (p, existing) = std::mem::replace(&mut self.paths[i], (String::new(), MethodRouter::new()));
                self.paths[i] = (p, existing.merge(route));
            }
            None => {
                self.by_path.insert(path.to_string(), self.paths.len());
                self.paths.push((path.to_string(), route));
            }
        }
        true
    }

    /// Bound routes in registration order.
    pub fn routes(&self) -> &[(Method, String)] {
        &self.order
    }

    /// Unbound verbs on a known path answer 404, same as unknown paths.
    pub fn into_router(self) -> Router {
        self.paths
            .into_iter()
            .fold(Router::new(), |router, (path, route)| router.route(&path, route.fallback(not_found)))
            .fallback(not_found)
    }
}

pub async fn not_found() -> AppError {
    AppError::not_found("route not found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, http::StatusCode, routing::get, routing::post};
    use tower::ServiceExt;

    async fn status(router: Router, method: Method, uri: &str) -> StatusCode {
        let req = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
        router.oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn first_registration_wins_and_missing_verbs_are_404() {
        let mut table = RouteTable::new();
        assert!(table.add(Method::GET, "/a", get(|| async { "first" })));
        assert!(!table.add(Method::GET, "/a", get(|| async { "second" })));
        assert!(table.add(Method::POST, "/a", post(|| async { "post" })));
        assert_eq!(table.routes().len(), 2);
        assert!(table.contains(&Method::POST, "/a"));

        let router = table.into_router();
        let res = router
            .clone()
            .oneshot(Request::builder().uri("/a").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"first");
        assert_eq!(status(router.clone(), Method::DELETE, "/a").await, StatusCode::NOT_FOUND);
        assert_eq!(status(router, Method::GET, "/b").await, StatusCode::NOT_FOUND);
    }
}
