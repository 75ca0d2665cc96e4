//! Generic CRUD execution over a document store, with hooks and population.

use super::hooks::{HookContext, HookPipeline};
use super::populate::{populate, PopulateSpec};
use super::validation::EntityValidator;
use crate::context::RequestMeta;
use crate::error::AppError;
use crate::query::QueryContext;
use crate::repository::{
    Catalog, DeleteResult, Operation, Page, Repository, RepositoryRef, ValidationMode, ValidationResult,
    WriteRequest,
};
use crate::schema::EntitySchema;
use crate::store::filter::{is_operator_update, parse_sort, project};
use crate::store::{FindOptions, StoreRef};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

const DEFAULT_PAGE_SIZE: u64 = 100;
const MAX_PAGE_SIZE: u64 = 1000;

/// Repository for one entity schema backed by any [`crate::store::DocumentStore`].
pub struct DocumentRepository {
    name: String,
    schema: EntitySchema,
    store: StoreRef,
    catalog: Catalog,
    hooks: HookPipeline,
}

impl DocumentRepository {
    pub fn new(schema: EntitySchema, store: StoreRef, catalog: Catalog) -> Self {
        Self {
            name: format!("{}Repository", schema.name),
            schema,
            store,
            catalog,
            hooks: HookPipeline::new(),
        }
    }

    pub fn with_hooks(mut self, hooks: HookPipeline) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn hooks(&self) -> &HookPipeline {
        &self.hooks
    }

    /// Shares the repository and makes it resolvable by entity name.
    pub fn register(self) -> Result<RepositoryRef, AppError> {
        let catalog = self.catalog.clone();
        let repo: RepositoryRef = Arc::new(self);
        catalog.register(&repo)?;
        Ok(repo)
    }

    fn collection(&self) -> &str {
        &self.schema.name
    }

    fn options(&self) -> FindOptions {
        FindOptions {
            text_fields: self.schema.text_fields.clone(),
            ..Default::default()
        }
    }

    /// Soft-deleted documents are hidden unless asked for or filtered on explicitly.
    fn live_filter(&self, query: &Map<String, Value>, include_deleted: bool) -> Map<String, Value> {
        let mut filter = query.clone();
        if !include_deleted && !filter.contains_key("deletedAt") {
            filter.insert("deletedAt".into(), json!({ "$exists": false }));
        }
        filter
    }

    fn now() -> Value {
        json!(chrono::Utc::now().to_rfc3339())
    }

    fn prepare_new(&self, data: Value) -> Result<Map<String, Value>, AppError> {
        let Value::Object(mut doc) = data else {
            return Err(AppError::unprocessable("data must be an object"));
        };
        self.schema.retain_known(&mut doc);
        self.schema.cast(&mut doc);
        self.schema.apply_defaults(&mut doc);
        doc.remove("deletedAt");
        let has_id = doc
            .get("id")
            .and_then(Value::as_str)
            .map_or(false, |s| !s.is_empty());
        if !has_id {
            doc.insert("id".into(), json!(uuid::Uuid::new_v4().to_string()));
        }
        if self.schema.timestamps {
            let now = Self::now();
            doc.insert("createdAt".into(), now.clone());
            doc.insert("updatedAt".into(), now);
        }
        Ok(doc)
    }

    /// Normalizes a write payload into operator form, dropping unknown and id fields.
    fn prepare_update(&self, data: &Value) -> Result<Map<String, Value>, AppError> {
        let Value::Object(body) = data else {
            return Err(AppError::unprocessable("data must be an object"));
        };
        let mut update = Map::new();
        let mut set = Map::new();
        if is_operator_update(body) {
            for (k, v) in body {
                if k.starts_with('$') {
                    update.insert(k.clone(), v.clone());
                } else {
                    set.insert(k.clone(), v.clone());
                }
            }
        } else {
            set = body.clone();
        }
        if let Some(Value::Object(explicit)) = update.remove("$set") {
            set.extend(explicit);
        }
        if self.schema.timestamps {
            set.insert("updatedAt".into(), Self::now());
        }
        self.schema.cast(&mut set);
        if !set.is_empty() {
            update.insert("$set".into(), Value::Object(set));
        }
        for fields in update.values_mut() {
            if let Value::Object(f) = fields {
                f.retain(|k, _| k != "id" && self.schema.is_known(k));
            }
        }
        Ok(update)
    }

    async fn ensure_unique(&self, docs: &[Map<String, Value>]) -> Result<(), AppError> {
        let mut keys: Vec<&str> = vec!["id"];
        keys.extend(self.schema.unique_fields().map(|f| f.name.as_str()));
        for key in keys {
            let mut seen = HashSet::new();
            for doc in docs {
                let Some(v) = doc.get(key).filter(|v| !v.is_null()) else { continue };
                if !seen.insert(v.to_string()) {
                    return Err(duplicate(key, v));
                }
                let mut filter = Map::new();
                filter.insert(key.to_string(), v.clone());
                if self.store.count(self.collection(), &filter, &self.options()).await? > 0 {
                    return Err(duplicate(key, v));
                }
            }
        }
        Ok(())
    }

    async fn ensure_unique_update(&self, update: &Map<String, Value>, ids: &[String]) -> Result<(), AppError> {
        let Some(Value::Object(set)) = update.get("$set") else {
            return Ok(());
        };
        for f in self.schema.unique_fields() {
            let Some(v) = set.get(&f.name).filter(|v| !v.is_null()) else { continue };
            if ids.len() > 1 {
                return Err(duplicate(&f.name, v));
            }
            let mut filter = Map::new();
            filter.insert(f.name.clone(), v.clone());
            filter.insert("id".into(), json!({ "$nin": ids }));
            if self.store.count(self.collection(), &filter, &self.options()).await? > 0 {
                return Err(duplicate(&f.name, v));
            }
        }
        Ok(())
    }

    async fn populate_docs(&self, docs: &mut [Value], populates: &[Value], meta: &RequestMeta) -> Result<(), AppError> {
        if populates.is_empty() {
            return Ok(());
        }
        let specs = PopulateSpec::parse(populates)?;
        populate(&self.schema, &self.catalog, docs, &specs, meta).await
    }

    /// Runs before-hooks of a read and folds their changes back into the context.
    async fn before_read(&self, op: Operation, mut q: QueryContext) -> Result<(HookContext, QueryContext), AppError> {
        let mut hctx = HookContext::new(op, Value::Null, q.query.clone(), q.populates.clone(), q.meta.clone());
        self.hooks.run_before(self, &mut hctx).await?;
        q.query = hctx.query.clone();
        q.populates = hctx.populates.clone();
        Ok((hctx, q))
    }

    async fn load(&self, q: &QueryContext, skip: Option<u64>, limit: Option<u64>) -> Result<Vec<Value>, AppError> {
        let filter = self.live_filter(&q.query, q.soft_delete);
        let opts = FindOptions {
            sort: q.sort.as_deref().map(parse_sort).unwrap_or_default(),
            skip,
            limit,
            text_fields: self.schema.text_fields.clone(),
        };
        let docs = self.store.find(self.collection(), &filter, &opts).await?;
        let mut docs: Vec<Value> = docs
            .into_iter()
            .map(|d| project(d, q.projection.as_ref(), q.select.as_ref()))
            .collect();
        self.populate_docs(&mut docs, &q.populates, &q.meta).await?;
        Ok(docs)
    }

    /// Updates the first (`one`) or every live match of the hook context's query.
    async fn write_update(&self, hctx: &HookContext, one: bool) -> Result<Vec<Value>, AppError> {
        let update = self.prepare_update(&hctx.data)?;
        let filter = self.live_filter(&hctx.query, false);
        let opts = FindOptions {
            limit: one.then_some(1),
            ..self.options()
        };
        let targets = self.store.find(self.collection(), &filter, &opts).await?;
        let ids: Vec<String> = targets
            .iter()
            .filter_map(|d| d.get("id").and_then(Value::as_str).map(String::from))
            .collect();
        if ids.is_empty() || update.is_empty() {
            return Ok(targets);
        }
        self.ensure_unique_update(&update, &ids).await?;
        let mut by_id = Map::new();
        by_id.insert("id".into(), json!({ "$in": ids }));
        let mut updated = self
            .store
            .update(self.collection(), &by_id, &update, &FindOptions::default())
            .await?;
        self.populate_docs(&mut updated, &hctx.populates, &hctx.meta).await?;
        Ok(updated)
    }
}

fn duplicate(field: &str, v: &Value) -> AppError {
    AppError::conflict(format!("duplicate value {} for unique field {}", v, field))
}

fn page_offset(page: u64, page_size: u64) -> Result<u64, AppError> {
    (page - 1)
        .checked_mul(page_size)
        .ok_or_else(|| AppError::bad_request("page out of range"))
}

fn into_array(v: Value) -> Result<Vec<Value>, AppError> {
    match v {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        _ => Err(AppError::internal("hook returned a non-array result")),
    }
}

fn into_option(v: Value) -> Option<Value> {
    match v {
        Value::Null => None,
        other => Some(other),
    }
}

#[async_trait]
impl Repository for DocumentRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    async fn validate_entity(&self, data: &Value, mode: ValidationMode) -> Result<ValidationResult, AppError> {
        Ok(EntityValidator::validate(&self.schema, data, mode))
    }

    async fn list(&self, ctx: QueryContext) -> Result<Page, AppError> {
        let (hctx, q) = self.before_read(Operation::List, ctx).await?;
        let page = q.page.unwrap_or(1).max(1);
        let page_size = q.page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let skip = page_offset(page, page_size)?;
        let filter = self.live_filter(&q.query, q.soft_delete);
        let total = self.store.count(self.collection(), &filter, &self.options()).await?;
        let docs = self.load(&q, Some(skip), Some(page_size)).await?;
        let data = into_array(self.hooks.run_after(self, &hctx, Value::Array(docs)).await?)?;
        Ok(Page {
            data,
            total,
            page,
            page_size,
            total_pages: total.div_ceil(page_size),
        })
    }

    async fn find(&self, ctx: QueryContext) -> Result<Vec<Value>, AppError> {
        let (hctx, q) = self.before_read(Operation::Find, ctx).await?;
        let (skip, limit) = match (q.page, q.page_size) {
            (None, None) => (None, None),
            (page, size) => {
                let size = size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
                (Some(page_offset(page.unwrap_or(1).max(1), size)?), Some(size))
            }
        };
        let docs = self.load(&q, skip, limit).await?;
        into_array(self.hooks.run_after(self, &hctx, Value::Array(docs)).await?)
    }

    async fn find_one(&self, ctx: QueryContext) -> Result<Option<Value>, AppError> {
        let (hctx, q) = self.before_read(Operation::FindOne, ctx).await?;
        let doc = self.load(&q, None, Some(1)).await?.into_iter().next().unwrap_or(Value::Null);
        Ok(into_option(self.hooks.run_after(self, &hctx, doc).await?))
    }

    async fn create(&self, req: WriteRequest) -> Result<Value, AppError> {
        let mut hctx = HookContext::new(Operation::Create, req.data, req.query, req.populates, req.meta);
        self.hooks.run_before(self, &mut hctx).await?;
        let doc = self.prepare_new(hctx.data.clone())?;
        self.ensure_unique(std::slice::from_ref(&doc)).await?;
        let mut stored = self.store.insert(self.collection(), vec![doc]).await?;
        self.populate_docs(&mut stored, &hctx.populates, &hctx.meta).await?;
        let created = stored
            .into_iter()
            .next()
            .ok_or_else(|| AppError::internal("insert returned no document"))?;
        tracing::debug!(repository = %self.name, id = ?created.get("id"), "created");
        self.hooks.run_after(self, &hctx, created).await
    }

    async fn create_many(&self, req: WriteRequest) -> Result<Vec<Value>, AppError> {
        let mut hctx = HookContext::new(Operation::CreateMany, req.data, req.query, req.populates, req.meta);
        self.hooks.run_before(self, &mut hctx).await?;
        let Value::Array(items) = hctx.data.clone() else {
            return Err(AppError::unprocessable("data must be array"));
        };
        let docs = items
            .into_iter()
            .map(|item| self.prepare_new(item))
            .collect::<Result<Vec<_>, _>>()?;
        self.ensure_unique(&docs).await?;
        let mut stored = self.store.insert(self.collection(), docs).await?;
        self.populate_docs(&mut stored, &hctx.populates, &hctx.meta).await?;
        into_array(self.hooks.run_after(self, &hctx, Value::Array(stored)).await?)
    }

    async fn update(&self, req: WriteRequest) -> Result<Vec<Value>, AppError> {
        let mut hctx = HookContext::new(Operation::Update, req.data, req.query, req.populates, req.meta);
        self.hooks.run_before(self, &mut hctx).await?;
        let updated = self.write_update(&hctx, false).await?;
        into_array(self.hooks.run_after(self, &hctx, Value::Array(updated)).await?)
    }

    async fn update_one(&self, req: WriteRequest) -> Result<Option<Value>, AppError> {
        let mut hctx = HookContext::new(Operation::UpdateOne, req.data, req.query, req.populates, req.meta);
        self.hooks.run_before(self, &mut hctx).await?;
        let updated = self
            .write_update(&hctx, true)
            .await?
            .into_iter()
            .next()
            .unwrap_or(Value::Null);
        Ok(into_option(self.hooks.run_after(self, &hctx, updated).await?))
    }

    async fn delete(&self, req: WriteRequest) -> Result<DeleteResult, AppError> {
        let soft = req.soft_delete;
        let mut hctx = HookContext::new(Operation::Delete, Value::Null, req.query, Vec::new(), req.meta);
        self.hooks.run_before(self, &mut hctx).await?;
        let filter = self.live_filter(&hctx.query, false);
        let deleted_count = if soft {
            let mark = json!({ "$set": { "deletedAt": Self::now() } });
            let mark = mark.as_object().cloned().unwrap_or_default();
            self.store
                .update(self.collection(), &filter, &mark, &self.options())
                .await?
                .len() as u64
        } else {
            self.store.delete(self.collection(), &filter, &self.options()).await?
        };
        let result = serde_json::to_value(DeleteResult { deleted_count })?;
        let result = self.hooks.run_after(self, &hctx, result).await?;
        Ok(serde_json::from_value(result)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDef;
    use crate::service::hooks::Hook;
    use crate::store::MemoryStore;

    fn todo_schema() -> EntitySchema {
        EntitySchema::new("Todo")
            .field(FieldDef::string("title").required().unique())
            .field(FieldDef::string("content"))
            .field(FieldDef::number("votes").default_value(json!(0)))
            .field(FieldDef::reference("comments", "Comment").array())
            .timestamps()
            .text_index(&["title"])
    }

    fn repos() -> (RepositoryRef, RepositoryRef) {
        let catalog = Catalog::new();
        let store: StoreRef = Arc::new(MemoryStore::new());
        let comments = DocumentRepository::new(
            EntitySchema::new("Comment").field(FieldDef::string("text")),
            store.clone(),
            catalog.clone(),
        )
        .register()
        .unwrap();
        let todos = DocumentRepository::new(todo_schema(), store, catalog).register().unwrap();
        (todos, comments)
    }

    fn data(v: Value) -> WriteRequest {
        WriteRequest::new(v)
    }

    #[tokio::test]
    async fn create_applies_defaults_ids_and_timestamps() {
        let (todos, _comments) = repos();
        let created = todos.create(data(json!({"title": "a", "junk": 1}))).await.unwrap();
        assert_eq!(created["votes"], json!(0));
        assert!(created["id"].as_str().is_some());
        assert!(created["createdAt"].as_str().is_some());
        assert!(created.get("junk").is_none());
    }

    #[tokio::test]
    async fn unique_fields_are_enforced() {
        let (todos, _comments) = repos();
        todos.create(data(json!({"title": "a"}))).await.unwrap();
        let err = todos.create(data(json!({"title": "a"}))).await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);
        let err = todos
            .create_many(data(json!([{"title": "b"}, {"title": "b"}])))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn list_pages_and_counts() {
        let (todos, _comments) = repos();
        let items: Vec<Value> = (0..5).map(|i| json!({"title": format!("t{}", i), "votes": i})).collect();
        todos.create_many(data(Value::Array(items))).await.unwrap();
        let page = todos
            .list(QueryContext {
                page: Some(2),
                page_size: Some(2),
                sort: Some("-votes".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);
        let votes: Vec<_> = page.data.iter().map(|d| d["votes"].as_i64().unwrap()).collect();
        assert_eq!(votes, vec![2, 1]);
    }

    #[tokio::test]
    async fn pages_past_the_addressable_range_are_rejected() {
        let (todos, _comments) = repos();
        let huge = QueryContext {
            page: Some(u64::MAX),
            ..Default::default()
        };
        let err = todos.list(huge.clone()).await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
        let err = todos.find(huge).await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);

        let last = todos
            .list(QueryContext {
                page: Some(u64::MAX / MAX_PAGE_SIZE),
                page_size: Some(MAX_PAGE_SIZE),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(last.data.is_empty());
    }

    #[tokio::test]
    async fn update_one_and_operators() {
        let (todos, _comments) = repos();
        let created = todos.create(data(json!({"title": "a"}))).await.unwrap();
        let id = created["id"].as_str().unwrap().to_string();
        let mut q = Map::new();
        q.insert("id".into(), json!(id));
        let updated = todos
            .update_one(data(json!({"$inc": {"votes": 2}, "content": "x"})).with_query(q.clone()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated["votes"], json!(2));
        assert_eq!(updated["content"], json!("x"));
        assert_eq!(updated["id"], json!(id));

        let mut missing = Map::new();
        missing.insert("id".into(), json!("nope"));
        assert!(todos.update_one(data(json!({"content": "y"})).with_query(missing)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn soft_delete_hides_documents() {
        let (todos, _comments) = repos();
        todos.create(data(json!({"title": "a"}))).await.unwrap();
        let mut req = WriteRequest::filter(Map::new());
        req.soft_delete = true;
        assert_eq!(todos.delete(req).await.unwrap().deleted_count, 1);
        assert!(todos.find(QueryContext::default()).await.unwrap().is_empty());
        let all = todos
            .find(QueryContext {
                soft_delete: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0]["deletedAt"].is_string());
    }

    #[tokio::test]
    async fn references_are_populated() {
        let (todos, comments) = repos();
        let c = comments.create(data(json!({"text": "hi"}))).await.unwrap();
        todos
            .create(data(json!({"title": "a", "comments": [c["id"].clone()]})))
            .await
            .unwrap();
        let found = todos
            .find_one(QueryContext::default().with_populates(vec![json!("comments")]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found["comments"][0]["text"], json!("hi"));
    }

    #[tokio::test]
    async fn text_search_uses_index_fields() {
        let (todos, _comments) = repos();
        todos.create(data(json!({"title": "Buy milk", "content": "shoes"}))).await.unwrap();
        let mut q = Map::new();
        q.insert("$text".into(), json!({"$search": "shoes"}));
        assert!(todos.find(QueryContext::new(q)).await.unwrap().is_empty());
        let mut q = Map::new();
        q.insert("$text".into(), json!({"$search": "milk"}));
        assert_eq!(todos.find(QueryContext::new(q)).await.unwrap().len(), 1);
    }

    struct Tag(&'static str);

    #[async_trait]
    impl Hook for Tag {
        fn name(&self) -> &str {
            self.0
        }

        fn operations(&self) -> &[Operation] {
            &[Operation::Create]
        }

        async fn before(&self, _repo: &dyn Repository, ctx: &mut HookContext) -> Result<(), AppError> {
            let content = ctx.data["content"].as_str().unwrap_or("").to_string();
            ctx.data["content"] = json!(format!("{}{}", content, self.0));
            Ok(())
        }

        async fn after(&self, _repo: &dyn Repository, _ctx: &HookContext, mut result: Value) -> Result<Value, AppError> {
            result["after"] = json!(self.0);
            Ok(result)
        }
    }

    #[tokio::test]
    async fn hooks_run_in_registration_order() {
        let store: StoreRef = Arc::new(MemoryStore::new());
        let repo = DocumentRepository::new(todo_schema(), store, Catalog::new())
            .with_hooks(HookPipeline::new().with(Tag("1")).with(Tag("2")));
        assert_eq!(repo.hooks().names_for(Operation::Create), vec!["1", "2"]);
        assert!(repo.hooks().names_for(Operation::Delete).is_empty());
        let created = repo.create(data(json!({"title": "a"}))).await.unwrap();
        assert_eq!(created["content"], json!("12"));
        assert_eq!(created["after"], json!("2"));
    }
}
