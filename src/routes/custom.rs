//! Hand-declared routes, bound after the generated ones.

use super::middleware::apply_chain;
use super::table::RouteTable;
use crate::config::{join_path, parse_route_key, RouteConfig};
use axum::{
    extract::Request,
    routing::{on, MethodFilter},
};

/// Binds the descriptor's custom routes. Declarations that cannot be mounted
/// are skipped with a warning.
pub fn bind_custom(table: &mut RouteTable, cfg: &RouteConfig) {
    for (key, route) in &cfg.custom_routes {
        let (verb, sub) = match parse_route_key(&cfg.path, key) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(prefix = %cfg.path, error = %e, "custom route skipped");
                continue;
            }
        };
        let Ok(filter) = MethodFilter::try_from(verb.clone()) else {
            tracing::warn!(prefix = %cfg.path, key = %key, "verb cannot be routed; custom route skipped");
            continue;
        };
        let Some(endpoint) = route.endpoint.clone() else {
            tracing::warn!(prefix = %cfg.path, key = %key, "no handlers; custom route skipped");
            continue;
        };
        let path = join_path(&cfg.path, &sub);
        let mut chain = cfg.middleware.clone();
        chain.extend(route.chain.iter().cloned());
        let bound = apply_chain(on(filter, move |req: Request| endpoint.call(req)), &chain);
        if table.add(verb.clone(), &path, bound) {
            tracing::info!(method = %verb, path = %path, handler = %key, "route bound");
        } else {
            tracing::warn!(method = %verb, path = %path, key = %key, "route already bound; skipped");
        }
    }
}
