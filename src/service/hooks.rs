//! Ordered before/after interceptors attached to a repository instance.

use crate::context::RequestMeta;
use crate::error::AppError;
use crate::repository::{Operation, Repository};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Mutable state of one repository operation as seen by hooks.
#[derive(Clone, Debug)]
pub struct HookContext {
    pub operation: Operation,
    /// Write payload; `Null` for reads and deletes.
    pub data: Value,
    pub query: Map<String, Value>,
    pub populates: Vec<Value>,
    pub meta: RequestMeta,
    /// Values carried from a before-hook to the after-hooks of the same operation.
    pub scratch: Map<String, Value>,
}

impl HookContext {
    pub fn new(operation: Operation, data: Value, query: Map<String, Value>, populates: Vec<Value>, meta: RequestMeta) -> Self {
        Self {
            operation,
            data,
            query,
            populates,
            meta,
            scratch: Map::new(),
        }
    }
}

/// An interceptor. `repo` is the repository running the operation, so hooks can
/// read or write through it; those nested calls run their own hooks.
#[async_trait]
pub trait Hook: Send + Sync {
    fn name(&self) -> &str;

    fn operations(&self) -> &[Operation];

    async fn before(&self, _repo: &dyn Repository, _ctx: &mut HookContext) -> Result<(), AppError> {
        Ok(())
    }

    /// Receives the operation result as JSON and returns the (possibly replaced) result.
    async fn after(&self, _repo: &dyn Repository, _ctx: &HookContext, result: Value) -> Result<Value, AppError> {
        Ok(result)
    }
}

#[derive(Clone, Default)]
pub struct HookPipeline {
    hooks: Vec<Arc<dyn Hook>>,
}

impl HookPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a hook; hooks run in the order they were added.
    pub fn with(mut self, hook: impl Hook + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn push(&mut self, hook: Arc<dyn Hook>) {
        self.hooks.push(hook);
    }

    /// Appends every hook of `other` after the existing ones.
    pub fn extend(&mut self, other: HookPipeline) {
        self.hooks.extend(other.hooks);
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Names of the hooks that apply to `op`, in run order.
    pub fn names_for(&self, op: Operation) -> Vec<&str> {
        self.applicable(op).map(|h| h.name()).collect()
    }

    fn applicable(&self, op: Operation) -> impl Iterator<Item = &Arc<dyn Hook>> {
        self.hooks.iter().filter(move |h| h.operations().contains(&op))
    }

    pub async fn run_before(&self, repo: &dyn Repository, ctx: &mut HookContext) -> Result<(), AppError> {
        for hook in self.applicable(ctx.operation) {
            tracing::trace!(hook = hook.name(), operation = %ctx.operation, "before hook");
            hook.before(repo, ctx).await?;
        }
        Ok(())
    }

    pub async fn run_after(&self, repo: &dyn Repository, ctx: &HookContext, mut result: Value) -> Result<Value, AppError> {
        for hook in self.applicable(ctx.operation) {
            tracing::trace!(hook = hook.name(), operation = %ctx.operation, "after hook");
            result = hook.after(repo, ctx, result).await?;
        }
        Ok(result)
    }
}
