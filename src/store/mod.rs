//! Document storage backends.

pub mod filter;
pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::{ensure_database_exists, PgStore};

use crate::error::AppError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Ordering, paging and text-search settings for a read.
#[derive(Clone, Debug, Default)]
pub struct FindOptions {
    pub sort: Vec<(String, SortOrder)>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
    /// Fields searched by `$text`; empty means every top-level string field.
    pub text_fields: Vec<String>,
}

/// Schemaless JSON document persistence, one collection per entity.
///
/// Filters and updates use the operator language implemented in [`filter`].
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persist fully prepared documents (ids assigned). Returns them as stored.
    async fn insert(&self, collection: &str, docs: Vec<Map<String, Value>>) -> Result<Vec<Value>, AppError>;

    async fn find(&self, collection: &str, filter: &Map<String, Value>, opts: &FindOptions) -> Result<Vec<Value>, AppError>;

    async fn count(&self, collection: &str, filter: &Map<String, Value>, opts: &FindOptions) -> Result<u64, AppError>;

    /// Apply `update` to every match and return the updated documents.
    async fn update(
        &self,
        collection: &str,
        filter: &Map<String, Value>,
        update: &Map<String, Value>,
        opts: &FindOptions,
    ) -> Result<Vec<Value>, AppError>;

    /// Remove every match; returns the number removed.
    async fn delete(&self, collection: &str, filter: &Map<String, Value>, opts: &FindOptions) -> Result<u64, AppError>;

    /// Create whatever backing structure a collection needs.
    async fn ensure_collection(&self, _collection: &str) -> Result<(), AppError> {
        Ok(())
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

pub type StoreRef = Arc<dyn DocumentStore>;
