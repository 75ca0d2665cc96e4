//! Builds parameterized SELECT, INSERT, UPDATE, DELETE over `(id, data jsonb)` collection tables.

use super::params::PgBindValue;
use crate::error::AppError;
use crate::store::filter::{exact_phrase, is_operator_doc, sub_filters, truthy};
use crate::store::{FindOptions, SortOrder};
use serde_json::{Map, Value};

/// Quote identifier for PostgreSQL.
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<PgBindValue>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: PgBindValue) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }

    fn push_json(&mut self, v: &Value) -> u32 {
        self.push_param(PgBindValue::from_json(v))
    }

    /// Binds a dotted path as a `text[]` literal and returns the `#>` expression.
    fn path_expr(&mut self, path: &str, as_text: bool) -> String {
        let literal = format!(
            "{{{}}}",
            path.split('.')
                .map(|seg| format!("\"{}\"", seg.replace('\\', "\\\\").replace('"', "\\\"")))
                .collect::<Vec<_>>()
                .join(",")
        );
        let n = self.push_param(PgBindValue::text(literal));
        let op = if as_text { "#>>" } else { "#>" };
        format!("(data {} ${}::text[])", op, n)
    }
}

/// Schema, table and index DDL for one collection.
pub fn collection_ddl(schema: &str, table: &str) -> Vec<String> {
    let q_table = qualified_table(schema, table);
    vec![
        format!("CREATE SCHEMA IF NOT EXISTS {}", quoted(schema)),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                seq BIGSERIAL,
                id TEXT PRIMARY KEY,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            q_table
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} USING GIN (data jsonb_path_ops)",
            quoted(&format!("{}_data_idx", table)),
            q_table
        ),
    ]
}

/// INSERT one document; params are `(id, data)`.
pub fn insert_document(schema: &str, table: &str) -> String {
    format!(
        "INSERT INTO {} (id, data) VALUES ($1, $2::jsonb) RETURNING data",
        qualified_table(schema, table)
    )
}

/// UPDATE one document by id; params are `(data, id)`.
pub fn update_document(schema: &str, table: &str) -> String {
    format!(
        "UPDATE {} SET data = $1::jsonb, updated_at = NOW() WHERE id = $2 RETURNING data",
        qualified_table(schema, table)
    )
}

/// SELECT data with filter, ORDER BY requested fields then insertion order, optional LIMIT/OFFSET.
pub fn select_documents(
    schema: &str,
    table: &str,
    filter: &Map<String, Value>,
    opts: &FindOptions,
) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let where_clause = where_clause(&mut q, filter, &opts.text_fields)?;
    let mut order_parts = Vec::new();
    for (field, order) in &opts.sort {
        let p = q.path_expr(field, false);
        order_parts.push(match order {
            SortOrder::Asc => format!("{} ASC NULLS FIRST", p),
            SortOrder::Desc => format!("{} DESC NULLS LAST", p),
        });
    }
    order_parts.push("seq".into());
    let limit_clause = opts.limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
    let offset_clause = opts.skip.map(|n| format!(" OFFSET {}", n)).unwrap_or_default();
    q.sql = format!(
        "SELECT data FROM {}{} ORDER BY {}{}{}",
        qualified_table(schema, table),
        where_clause,
        order_parts.join(", "),
        limit_clause,
        offset_clause
    );
    Ok(q)
}

pub fn count_documents(
    schema: &str,
    table: &str,
    filter: &Map<String, Value>,
    opts: &FindOptions,
) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let where_clause = where_clause(&mut q, filter, &opts.text_fields)?;
    q.sql = format!("SELECT COUNT(*) FROM {}{}", qualified_table(schema, table), where_clause);
    Ok(q)
}

/// SELECT id, data ... FOR UPDATE, for read-modify-write inside a transaction.
pub fn lock_documents(
    schema: &str,
    table: &str,
    filter: &Map<String, Value>,
    opts: &FindOptions,
) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let where_clause = where_clause(&mut q, filter, &opts.text_fields)?;
    q.sql = format!(
        "SELECT id, data FROM {}{} ORDER BY seq FOR UPDATE",
        qualified_table(schema, table),
        where_clause
    );
    Ok(q)
}

pub fn delete_documents(
    schema: &str,
    table: &str,
    filter: &Map<String, Value>,
    opts: &FindOptions,
) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let where_clause = where_clause(&mut q, filter, &opts.text_fields)?;
    q.sql = format!("DELETE FROM {}{}", qualified_table(schema, table), where_clause);
    Ok(q)
}

fn where_clause(q: &mut QueryBuf, filter: &Map<String, Value>, text_fields: &[String]) -> Result<String, AppError> {
    let cond = filter_condition(q, filter, text_fields)?;
    Ok(if cond == "TRUE" {
        String::new()
    } else {
        format!(" WHERE {}", cond)
    })
}

fn filter_condition(q: &mut QueryBuf, filter: &Map<String, Value>, text_fields: &[String]) -> Result<String, AppError> {
    let mut parts = Vec::new();
    for (key, cond) in filter {
        let part = match key.as_str() {
            "$and" | "$or" | "$nor" => {
                let mut subs = Vec::new();
                for f in sub_filters(key, cond)? {
                    subs.push(filter_condition(q, f, text_fields)?);
                }
                match (key.as_str(), subs.is_empty()) {
                    ("$and", true) | ("$nor", true) => "TRUE".to_string(),
                    ("$or", true) => "FALSE".to_string(),
                    ("$and", false) => format!("({})", subs.join(" AND ")),
                    ("$or", false) => format!("({})", subs.join(" OR ")),
                    _ => format!("NOT COALESCE(({}), false)", subs.join(" OR ")),
                }
            }
            "$text" => {
                let search = cond
                    .get("$search")
                    .and_then(Value::as_str)
                    .ok_or_else(|| AppError::bad_request("$text requires a $search string"))?;
                text_condition(q, search, text_fields)
            }
            k if k.starts_with('$') => {
                return Err(AppError::bad_request(format!("unsupported query operator {}", k)));
            }
            path => field_condition(q, path, cond)?,
        };
        parts.push(part);
    }
    Ok(if parts.is_empty() {
        "TRUE".to_string()
    } else {
        parts.join(" AND ")
    })
}

fn field_condition(q: &mut QueryBuf, path: &str, cond: &Value) -> Result<String, AppError> {
    let Some(ops) = cond.as_object().filter(|_| is_operator_doc(cond)) else {
        return Ok(eq_condition(q, path, cond));
    };
    let mut parts = Vec::new();
    for (op, operand) in ops {
        let part = match op.as_str() {
            "$eq" => eq_condition(q, path, operand),
            "$ne" => format!("NOT COALESCE({}, false)", eq_condition(q, path, operand)),
            "$gt" | "$gte" | "$lt" | "$lte" => {
                let sql_op = match op.as_str() {
                    "$gt" => ">",
                    "$gte" => ">=",
                    "$lt" => "<",
                    _ => "<=",
                };
                let p = q.path_expr(path, false);
                let n = q.push_json(operand);
                format!(
                    "(jsonb_typeof({p}) = jsonb_typeof(${n}::jsonb) AND {p} {sql_op} ${n}::jsonb)",
                    p = p,
                    n = n,
                    sql_op = sql_op
                )
            }
            "$in" | "$nin" => {
                let items = operand
                    .as_array()
                    .ok_or_else(|| AppError::bad_request(format!("{} requires an array", op)))?;
                let any = if items.is_empty() {
                    "FALSE".to_string()
                } else {
                    let eqs: Vec<String> = items.iter().map(|v| eq_condition(q, path, v)).collect();
                    format!("({})", eqs.join(" OR "))
                };
                if op == "$in" {
                    any
                } else {
                    format!("NOT COALESCE({}, false)", any)
                }
            }
            "$exists" => {
                let p = q.path_expr(path, false);
                if truthy(operand) {
                    format!("{} IS NOT NULL", p)
                } else {
                    format!("{} IS NULL", p)
                }
            }
            "$regex" => {
                let pattern = operand
                    .as_str()
                    .ok_or_else(|| AppError::bad_request("$regex requires a string"))?;
                let insensitive = ops
                    .get("$options")
                    .and_then(Value::as_str)
                    .map_or(false, |o| o.contains('i'));
                let t = q.path_expr(path, true);
                let n = q.push_param(PgBindValue::text(pattern));
                format!("COALESCE({} {} ${}, false)", t, if insensitive { "~*" } else { "~" }, n)
            }
            "$options" => continue,
            "$not" => format!("NOT COALESCE({}, false)", field_condition(q, path, operand)?),
            "$size" => {
                let size = operand
                    .as_u64()
                    .ok_or_else(|| AppError::bad_request("$size requires a non-negative integer"))?;
                let p = q.path_expr(path, false);
                format!(
                    "CASE WHEN jsonb_typeof({p}) = 'array' THEN jsonb_array_length({p}) = {size} ELSE false END",
                    p = p,
                    size = size
                )
            }
            other => return Err(AppError::bad_request(format!("unsupported query operator {}", other))),
        };
        parts.push(part);
    }
    Ok(if parts.is_empty() {
        "TRUE".to_string()
    } else {
        format!("({})", parts.join(" AND "))
    })
}

/// Equality with array membership, mirroring the in-memory semantics.
fn eq_condition(q: &mut QueryBuf, path: &str, expected: &Value) -> String {
    let p = q.path_expr(path, false);
    if expected.is_null() {
        return format!("({p} IS NULL OR {p} = 'null'::jsonb)", p = p);
    }
    let n = q.push_json(expected);
    format!(
        "({p} = ${n}::jsonb OR (jsonb_typeof({p}) = 'array' AND {p} @> jsonb_build_array(${n}::jsonb)))",
        p = p,
        n = n
    )
}

fn like_pattern(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{}%", escaped)
}

fn text_condition(q: &mut QueryBuf, search: &str, text_fields: &[String]) -> String {
    let haystacks: Vec<String> = if text_fields.is_empty() {
        vec!["data::text".to_string()]
    } else {
        text_fields
            .iter()
            .map(|f| format!("COALESCE({}, '')", q.path_expr(f, true)))
            .collect()
    };
    let search = search.trim();
    let terms: Vec<String> = match exact_phrase(search) {
        Some(phrase) => vec![phrase.to_string()],
        None => search.split_whitespace().map(String::from).collect(),
    };
    if terms.is_empty() {
        return "FALSE".to_string();
    }
    let mut ors = Vec::new();
    for term in terms {
        let n = q.push_param(PgBindValue::text(like_pattern(&term)));
        for h in &haystacks {
            ors.push(format!("{} ILIKE ${} ESCAPE '\\'", h, n));
        }
    }
    format!("({})", ors.join(" OR "))
}
