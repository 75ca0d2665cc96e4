//! Generated CRUD routes for one descriptor.

use super::middleware::{apply_chain, Middleware};
use super::table::RouteTable;
use crate::config::{join_path, MethodName, RouteConfig};
use crate::error::AppError;
use crate::handlers::crud as h;
use crate::query::query_normalizer;
use crate::repository::RepositoryRef;
use axum::{
    http::Method,
    routing::{delete, get, post, put, MethodRouter},
};
use serde_json::Value;
use std::future::Future;

/// State of one generated route: the repository and where it is mounted.
#[derive(Clone)]
pub struct CrudTarget {
    pub repo: RepositoryRef,
    pub method: MethodName,
    pub verb: Method,
    pub path: String,
}

impl CrudTarget {
    /// Logs a failed operation with its route and hands the error on unchanged.
    pub fn reject(&self, err: AppError) -> AppError {
        if err.status_code().is_server_error() {
            tracing::error!(
                method = %self.verb,
                path = %self.path,
                repository = self.repo.name(),
                operation = %self.method,
                error = %err,
                "request failed"
            );
        } else {
            tracing::warn!(
                method = %self.verb,
                path = %self.path,
                repository = self.repo.name(),
                operation = %self.method,
                error = %err,
                "request rejected"
            );
        }
        err
    }

    pub async fn guard<T, F>(&self, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        fut.await.map_err(|e| self.reject(e))
    }

    /// Strips sensitive fields from a response document or list.
    pub fn redact(&self, value: &mut Value) {
        self.repo.schema().redact(value);
    }
}

fn endpoint(method: MethodName) -> MethodRouter<CrudTarget> {
    match method {
        MethodName::List => get(h::list),
        MethodName::Find => get(h::find),
        MethodName::FindOne => get(h::find_one),
        MethodName::Create => post(h::create),
        MethodName::BulkCreate => post(h::bulk_create),
        MethodName::Update => put(h::update),
        MethodName::UpdateOne => put(h::update_one),
        MethodName::Delete => delete(h::delete),
        MethodName::DeleteOne => delete(h::delete_one),
        MethodName::Schema => get(h::schema),
    }
}

/// Chain for one generated route: descriptor middleware, the query normalizer on
/// reads, then the per-method middleware.
fn chain_for(cfg: &RouteConfig, method: MethodName) -> Vec<Middleware> {
    let mut chain = cfg.middleware.clone();
    if method.is_read() {
        chain.push(query_normalizer());
    }
    chain.extend(cfg.middleware_for(method).iter().cloned());
    chain
}

/// Binds every enabled method of `cfg` into `table`.
pub fn bind_crud(table: &mut RouteTable, cfg: &RouteConfig, repo: &RepositoryRef) {
    for &method in &cfg.methods {
        let path = join_path(&cfg.path, method.sub_path());
        let verb = method.verb();
        let target = CrudTarget {
            repo: repo.clone(),
            method,
            verb: verb.clone(),
            path: path.clone(),
        };
        let route = apply_chain(endpoint(method).with_state(target), &chain_for(cfg, method));
        if table.add(verb.clone(), &path, route) {
            tracing::info!(
                method = %verb,
                path = %path,
                handler = %format!("{}.{}", repo.name(), method),
                "route bound"
            );
        } else {
            tracing::warn!(method = %verb, path = %path, operation = %method, "route already bound; skipped");
        }
    }
}
