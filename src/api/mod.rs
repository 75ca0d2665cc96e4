//! Route modules mounted by the server, in mount order.

mod account;
mod auth;
mod content;
mod sale;

use crate::routes::{common_routes, RouteDescriptor, RouteRegistry};
use crate::state::AppState;

pub fn route_modules(state: &AppState) -> Vec<RouteDescriptor> {
    vec![
        common_routes(state.store.clone()).into(),
        auth::routes(state),
        account::routes(state),
        sale::routes(state),
        content::routes(state),
    ]
}

pub fn registry(state: &AppState) -> RouteRegistry {
    route_modules(state)
        .into_iter()
        .fold(RouteRegistry::new(), |registry, d| registry.register(d))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use axum::http::Method;

    #[test]
    fn route_modules_pass_strict_validation() {
        let state = AppState::in_memory(Settings::for_secret("s")).unwrap();
        let registry = registry(&state);
        registry.validate().unwrap();
        let routes = registry.routes();
        for (method, path) in [
            (Method::GET, "/health"),
            (Method::POST, "/auth/login"),
            (Method::GET, "/todo/make-done"),
            (Method::PUT, "/invoice/:id"),
            (Method::GET, "/product-category/schema"),
        ] {
            assert!(routes.contains(&(method.clone(), path.to_string())), "{} {}", method, path);
        }
    }
}
