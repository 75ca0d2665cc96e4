//! In-memory document store. Collections keep insertion order.

use super::filter::{apply_update, matches, sort_docs};
use super::{DocumentStore, FindOptions};
use crate::error::AppError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<HashMap<String, Vec<Value>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned<T>(_: T) -> AppError {
        AppError::internal("memory store lock poisoned")
    }

    fn filtered(
        docs: &[Value],
        filter: &Map<String, Value>,
        opts: &FindOptions,
    ) -> Result<Vec<Value>, AppError> {
        let mut out = Vec::new();
        for doc in docs {
            if matches(doc, filter, &opts.text_fields)? {
                out.push(doc.clone());
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, collection: &str, docs: Vec<Map<String, Value>>) -> Result<Vec<Value>, AppError> {
        let mut collections = self.collections.write().map_err(Self::poisoned)?;
        let target = collections.entry(collection.to_string()).or_default();
        let stored: Vec<Value> = docs.into_iter().map(Value::Object).collect();
        target.extend(stored.iter().cloned());
        Ok(stored)
    }

    async fn find(&self, collection: &str, filter: &Map<String, Value>, opts: &FindOptions) -> Result<Vec<Value>, AppError> {
        let collections = self.collections.read().map_err(Self::poisoned)?;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut out = Self::filtered(docs, filter, opts)?;
        sort_docs(&mut out, &opts.sort);
        let skip = opts.skip.unwrap_or(0) as usize;
        let limit = opts.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(out.into_iter().skip(skip).take(limit).collect())
    }

    async fn count(&self, collection: &str, filter: &Map<String, Value>, opts: &FindOptions) -> Result<u64, AppError> {
        let collections = self.collections.read().map_err(Self::poisoned)?;
        let Some(docs) = collections.get(collection) else {
            return Ok(0);
        };
        Ok(Self::filtered(docs, filter, opts)?.len() as u64)
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Map<String, Value>,
        update: &Map<String, Value>,
        opts: &FindOptions,
    ) -> Result<Vec<Value>, AppError> {
        let mut collections = self.collections.write().map_err(Self::poisoned)?;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(Vec::new());
        };
        let mut updated = Vec::new();
        for doc in docs.iter_mut() {
            if !matches(doc, filter, &opts.text_fields)? {
                continue;
            }
            let Value::Object(map) = doc else { continue };
            let mut next = map.clone();
            apply_update(&mut next, update)?;
            *map = next;
            updated.push(doc.clone());
        }
        Ok(updated)
    }

    async fn delete(&self, collection: &str, filter: &Map<String, Value>, opts: &FindOptions) -> Result<u64, AppError> {
        let mut collections = self.collections.write().map_err(Self::poisoned)?;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let mut keep = Vec::with_capacity(docs.len());
        for doc in docs.iter() {
            keep.push(!matches(doc, filter, &opts.text_fields)?);
        }
        let before = docs.len();
        let mut flags = keep.into_iter();
        docs.retain(|_| flags.next().unwrap_or(true));
        Ok((before - docs.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SortOrder;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn insert_find_update_delete() {
        let store = MemoryStore::new();
        store
            .insert("Todo", vec![obj(json!({"id": "1", "n": 1})), obj(json!({"id": "2", "n": 2}))])
            .await
            .unwrap();
        let opts = FindOptions {
            sort: vec![("n".into(), SortOrder::Desc)],
            limit: Some(1),
            ..Default::default()
        };
        let found = store.find("Todo", &Map::new(), &opts).await.unwrap();
        assert_eq!(found, vec![json!({"id": "2", "n": 2})]);

        let updated = store
            .update("Todo", &obj(json!({"id": "1"})), &obj(json!({"$inc": {"n": 10}})), &FindOptions::default())
            .await
            .unwrap();
        assert_eq!(updated[0]["n"], json!(11));

        let removed = store.delete("Todo", &obj(json!({"n": {"$gt": 5}})), &FindOptions::default()).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count("Todo", &Map::new(), &FindOptions::default()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unknown_collection_is_empty() {
        let store = MemoryStore::new();
        assert!(store.find("Nope", &Map::new(), &FindOptions::default()).await.unwrap().is_empty());
        assert_eq!(store.delete("Nope", &Map::new(), &FindOptions::default()).await.unwrap(), 0);
    }
}
