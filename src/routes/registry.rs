//! Collects route descriptors and mounts them on one application router.

use super::crud::bind_crud;
use super::custom::bind_custom;
use super::table::RouteTable;
use crate::config::{validate_routes, RouteConfig};
use crate::error::ConfigError;
use axum::{http::Method, Router};

/// What a route module exports: one descriptor or several.
pub enum RouteDescriptor {
    Single(RouteConfig),
    Many(Vec<RouteConfig>),
}

impl From<RouteConfig> for RouteDescriptor {
    fn from(cfg: RouteConfig) -> Self {
        RouteDescriptor::Single(cfg)
    }
}

impl From<Vec<RouteConfig>> for RouteDescriptor {
    fn from(cfgs: Vec<RouteConfig>) -> Self {
        RouteDescriptor::Many(cfgs)
    }
}

/// Descriptors in discovery order; that order is the mount order.
#[derive(Clone, Debug, Default)]
pub struct RouteRegistry {
    configs: Vec<RouteConfig>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, descriptor: impl Into<RouteDescriptor>) -> Self {
        match descriptor.into() {
            RouteDescriptor::Single(cfg) => self.configs.push(cfg),
            RouteDescriptor::Many(cfgs) => self.configs.extend(cfgs),
        }
        self
    }

    pub fn configs(&self) -> &[RouteConfig] {
        &self.configs
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_routes(&self.configs)
    }

    /// Binds every descriptor. Bad prefixes and unmountable custom routes are
    /// skipped with a warning; a verb and path bound twice keeps the first.
    pub fn table(&self) -> RouteTable {
        let mut table = RouteTable::new();
        for cfg in &self.configs {
            if !cfg.path.starts_with('/') {
                tracing::warn!(prefix = %cfg.path, "prefix must start with '/'; descriptor skipped");
                continue;
            }
            if let Some(repo) = &cfg.repository {
                bind_crud(&mut table, cfg, repo);
            }
            bind_custom(&mut table, cfg);
        }
        table
    }

    /// Verb and full path of every route [`mount`](Self::mount) would bind.
    pub fn routes(&self) -> Vec<(Method, String)> {
        self.table().routes().to_vec()
    }

    pub fn mount(&self) -> Router {
        let table = self.table();
        tracing::info!(routes = table.routes().len(), descriptors = self.configs.len(), "routes mounted");
        table.into_router()
    }

    /// Like [`mount`](Self::mount) but refuses any descriptor problem.
    pub fn mount_strict(&self) -> Result<Router, ConfigError> {
        self.validate()?;
        Ok(self.mount())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CustomRoute;
    use crate::routes::middleware::Endpoint;

    fn done() -> CustomRoute {
        CustomRoute::new(Endpoint::new(|| async { "done" }))
    }

    #[test]
    fn descriptors_flatten_in_order() {
        let registry = RouteRegistry::new()
            .register(RouteConfig::new("/a").custom("GET /x", done()))
            .register(vec![
                RouteConfig::new("/b").custom("GET /x", done()),
                RouteConfig::new("/c").custom("POST /", done()),
            ]);
        let paths: Vec<_> = registry.configs().iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["/a", "/b", "/c"]);
        let routes = registry.routes();
        assert_eq!(
            routes,
            vec![
                (Method::GET, "/a/x".to_string()),
                (Method::GET, "/b/x".to_string()),
                (Method::POST, "/c".to_string()),
            ]
        );
    }

    #[test]
    fn lenient_mount_skips_what_strict_rejects() {
        let registry = RouteRegistry::new()
            .register(RouteConfig::new("/a").custom("FOO /x", done()).custom("GET /ok", done()))
            .register(RouteConfig::new("/a").custom("GET /y", done()).custom("GET /ok", done()));
        assert_eq!(
            registry.routes(),
            vec![(Method::GET, "/a/ok".to_string()), (Method::GET, "/a/y".to_string())]
        );
        assert!(registry.mount_strict().is_err());
    }
}
