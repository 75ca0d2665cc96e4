//! Startup validation of route descriptors.

use crate::config::{join_path, parse_route_key, RouteConfig};
use crate::error::ConfigError;
use axum::routing::MethodFilter;
use std::collections::HashSet;

/// Checks every descriptor and reports all problems at once.
pub fn validate_routes(configs: &[RouteConfig]) -> Result<(), ConfigError> {
    let mut issues = Vec::new();
    let mut seen: HashSet<(String, String)> = HashSet::new();
    for cfg in configs {
        if !cfg.path.starts_with('/') {
            issues.push(ConfigError::InvalidPrefix(cfg.path.clone()));
        }
        if cfg.crud_methods().is_empty() && cfg.custom_routes.is_empty() {
            issues.push(ConfigError::EmptyDescriptor(cfg.path.clone()));
        }

        for m in cfg.crud_methods() {
            let path = join_path(&cfg.path, m.sub_path());
            if !seen.insert((m.verb().to_string(), path.clone())) {
                issues.push(ConfigError::DuplicateRoute {
                    method: m.verb().to_string(),
                    path,
                });
            }
        }
        for (key, route) in &cfg.custom_routes {
            let (method, sub) = match parse_route_key(&cfg.path, key) {
                Ok(parsed) => parsed,
                Err(e) => {
                    issues.push(e);
                    continue;
                }
            };
            if MethodFilter::try_from(method.clone()).is_err() {
                issues.push(ConfigError::UnsupportedVerb {
                    prefix: cfg.path.clone(),
                    key: key.clone(),
                    verb: method.to_string(),
                });
                continue;
            }
            if route.endpoint.is_none() {
                issues.push(ConfigError::EmptyHandlers {
                    prefix: cfg.path.clone(),
                    key: key.clone(),
                });
                continue;
            }
            let path = join_path(&cfg.path, &sub);
            if !seen.insert((method.to_string(), path.clone())) {
                issues.push(ConfigError::DuplicateRoute {
                    method: method.to_string(),
                    path,
                });
            }
        }
    }
    if issues.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Rejected(issues))
    }
}
