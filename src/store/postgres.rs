//! PostgreSQL document store: one JSONB table per collection.

use super::filter::apply_update;
use super::{DocumentStore, FindOptions};
use crate::case::to_snake_case;
use crate::error::AppError;
use crate::sql::{
    collection_ddl, count_documents, delete_documents, insert_document, lock_documents, select_documents,
    update_document, PgBindValue, QueryBuf,
};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::ConnectOptions;
use sqlx::PgPool;
use std::str::FromStr;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    schema: String,
}

impl PgStore {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Table backing a collection, e.g. `ProductCategory` -> `product_category`.
    fn table(collection: &str) -> String {
        to_snake_case(collection)
    }

    fn bind_all<'q>(
        mut query: sqlx::query::QueryScalar<'q, sqlx::Postgres, Value, sqlx::postgres::PgArguments>,
        params: &'q [PgBindValue],
    ) -> sqlx::query::QueryScalar<'q, sqlx::Postgres, Value, sqlx::postgres::PgArguments> {
        for p in params {
            query = query.bind(p);
        }
        query
    }

    async fn fetch_documents(&self, q: &QueryBuf) -> Result<Vec<Value>, AppError> {
        tracing::debug!(sql = %q.sql, params = q.params.len(), "document query");
        let query = Self::bind_all(sqlx::query_scalar::<_, Value>(&q.sql), &q.params);
        Ok(query.fetch_all(&self.pool).await?)
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn insert(&self, collection: &str, docs: Vec<Map<String, Value>>) -> Result<Vec<Value>, AppError> {
        let sql = insert_document(&self.schema, &Self::table(collection));
        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(docs.len());
        for doc in docs {
            let id = doc
                .get("id")
                .and_then(Value::as_str)
                .map(String::from)
                .ok_or_else(|| AppError::internal("document has no id"))?;
            let data = PgBindValue::Json(Value::Object(doc));
            let row: Value = sqlx::query_scalar(&sql)
                .bind(&id)
                .bind(&data)
                .fetch_one(&mut *tx)
                .await?;
            stored.push(row);
        }
        tx.commit().await?;
        Ok(stored)
    }

    async fn find(&self, collection: &str, filter: &Map<String, Value>, opts: &FindOptions) -> Result<Vec<Value>, AppError> {
        let q = select_documents(&self.schema, &Self::table(collection), filter, opts)?;
        self.fetch_documents(&q).await
    }

    async fn count(&self, collection: &str, filter: &Map<String, Value>, opts: &FindOptions) -> Result<u64, AppError> {
        let q = count_documents(&self.schema, &Self::table(collection), filter, opts)?;
        let mut query = sqlx::query_scalar::<_, i64>(&q.sql);
        for p in &q.params {
            query = query.bind(p);
        }
        let n = query.fetch_one(&self.pool).await?;
        Ok(n.max(0) as u64)
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Map<String, Value>,
        update: &Map<String, Value>,
        opts: &FindOptions,
    ) -> Result<Vec<Value>, AppError> {
        let table = Self::table(collection);
        let q = lock_documents(&self.schema, &table, filter, opts)?;
        let write_sql = update_document(&self.schema, &table);
        let mut tx = self.pool.begin().await?;
        let mut query = sqlx::query_as::<_, (String, Value)>(&q.sql);
        for p in &q.params {
            query = query.bind(p);
        }
        let rows = query.fetch_all(&mut *tx).await?;
        let mut updated = Vec::with_capacity(rows.len());
        for (id, data) in rows {
            let Value::Object(mut doc) = data else { continue };
            apply_update(&mut doc, update)?;
            let data = PgBindValue::Json(Value::Object(doc));
            let row: Value = sqlx::query_scalar(&write_sql)
                .bind(&data)
                .bind(&id)
                .fetch_one(&mut *tx)
                .await?;
            updated.push(row);
        }
        tx.commit().await?;
        Ok(updated)
    }

    async fn delete(&self, collection: &str, filter: &Map<String, Value>, opts: &FindOptions) -> Result<u64, AppError> {
        let q = delete_documents(&self.schema, &Self::table(collection), filter, opts)?;
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(p);
        }
        Ok(query.execute(&self.pool).await?.rows_affected())
    }

    async fn ensure_collection(&self, collection: &str) -> Result<(), AppError> {
        for ddl in collection_ddl(&self.schema, &Self::table(collection)) {
            sqlx::query(&ddl).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").fetch_optional(&self.pool).await?;
        Ok(())
    }
}

/// Ensure the database in `database_url` exists; create it if not. Connects to the
/// default `postgres` database to run CREATE DATABASE. Call before creating the main pool.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| AppError::internal(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", quote_ident(&db_name)))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), AppError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| AppError::internal("DATABASE_URL: no path"))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    Ok((format!("{}postgres", base), db_name.to_string()))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_name_is_split_from_url() {
        let (admin, db) = parse_db_name_from_url("postgres://u:p@localhost:5432/shop?sslmode=disable").unwrap();
        assert_eq!(admin, "postgres://u:p@localhost:5432/postgres");
        assert_eq!(db, "shop");
    }

    #[test]
    fn collections_map_to_snake_case_tables() {
        assert_eq!(PgStore::table("ProductCategory"), "product_category");
    }
}
