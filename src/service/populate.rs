//! Resolution of reference fields and virtual relations on read results.

use crate::context::RequestMeta;
use crate::error::AppError;
use crate::query::QueryContext;
use crate::repository::{object_id, Catalog};
use crate::schema::{EntitySchema, PopulateDef};
use crate::store::filter::lookup;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// One population request: `"roles"` or `{"path": "roles", "select": "code", "populates": [...]}`.
#[derive(Clone, Debug, PartialEq)]
pub struct PopulateSpec {
    pub path: String,
    pub select: Option<Value>,
    pub populates: Vec<Value>,
}

impl PopulateSpec {
    pub fn parse(values: &[Value]) -> Result<Vec<Self>, AppError> {
        values.iter().map(Self::parse_one).collect()
    }

    fn parse_one(v: &Value) -> Result<Self, AppError> {
        match v {
            Value::String(path) => Ok(Self {
                path: path.clone(),
                select: None,
                populates: Vec::new(),
            }),
            Value::Object(m) => {
                let path = m
                    .get("path")
                    .and_then(Value::as_str)
                    .ok_or_else(|| AppError::bad_request("populate entries need a path"))?;
                let populates = match m.get("populates") {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::Array(items)) => items.clone(),
                    Some(other) => vec![other.clone()],
                };
                Ok(Self {
                    path: path.to_string(),
                    select: m.get("select").cloned(),
                    populates,
                })
            }
            _ => Err(AppError::bad_request("populate entries must be strings or objects")),
        }
    }
}

pub async fn populate(
    schema: &EntitySchema,
    catalog: &Catalog,
    docs: &mut [Value],
    specs: &[PopulateSpec],
    meta: &RequestMeta,
) -> Result<(), AppError> {
    if docs.is_empty() {
        return Ok(());
    }
    for spec in specs {
        if let Some(def) = schema.virtual_def(&spec.path) {
            populate_virtual(catalog, docs, def, spec, meta).await?;
            continue;
        }
        match schema.get(&spec.path).and_then(|f| f.reference.as_deref()) {
            Some(reference) => populate_reference(catalog, docs, reference, spec, meta).await?,
            None => {
                return Err(AppError::bad_request(format!(
                    "cannot populate {} on {}",
                    spec.path, schema.name
                )));
            }
        }
    }
    Ok(())
}

fn related_context(query: Map<String, Value>, spec: &PopulateSpec, meta: &RequestMeta) -> QueryContext {
    QueryContext {
        query,
        populates: spec.populates.clone(),
        select: spec.select.clone(),
        meta: meta.clone(),
        ..Default::default()
    }
}

async fn populate_reference(
    catalog: &Catalog,
    docs: &mut [Value],
    reference: &str,
    spec: &PopulateSpec,
    meta: &RequestMeta,
) -> Result<(), AppError> {
    let mut ids: Vec<String> = Vec::new();
    for doc in docs.iter() {
        match doc.get(&spec.path) {
            Some(Value::Array(items)) => ids.extend(items.iter().filter_map(object_id)),
            Some(v) => ids.extend(object_id(v)),
            None => {}
        }
    }
    ids.sort();
    ids.dedup();
    if ids.is_empty() {
        return Ok(());
    }
    let target = catalog.get(reference)?;
    let mut query = Map::new();
    query.insert("id".into(), json!({ "$in": ids }));
    let mut related = target.find(related_context(query, spec, meta)).await?;
    let by_id: HashMap<String, Value> = related
        .iter_mut()
        .filter_map(|r| {
            target.schema().redact(r);
            object_id(r).map(|id| (id, r.clone()))
        })
        .collect();
    for doc in docs.iter_mut() {
        let Some(v) = doc.get_mut(&spec.path) else { continue };
        match v {
            Value::Array(items) => {
                let resolved: Vec<Value> = items
                    .iter()
                    .filter_map(|i| object_id(i).and_then(|id| by_id.get(&id).cloned()))
                    .collect();
                *items = resolved;
            }
            Value::Null => {}
            other => {
                *other = object_id(other)
                    .and_then(|id| by_id.get(&id).cloned())
                    .unwrap_or(Value::Null);
            }
        }
    }
    Ok(())
}

async fn populate_virtual(
    catalog: &Catalog,
    docs: &mut [Value],
    def: &PopulateDef,
    spec: &PopulateSpec,
    meta: &RequestMeta,
) -> Result<(), AppError> {
    let mut locals: Vec<Value> = Vec::new();
    for doc in docs.iter() {
        match lookup(doc, &def.local_field) {
            Some(Value::Array(items)) => locals.extend(items.iter().cloned()),
            Some(Value::Null) | None => {}
            Some(v) => locals.push(v.clone()),
        }
    }
    locals.dedup();
    let related = if locals.is_empty() {
        Vec::new()
    } else {
        let target = catalog.get(&def.reference)?;
        let mut query = def.filter.clone();
        query.insert(def.foreign_field.clone(), json!({ "$in": locals }));
        let mut related = target.find(related_context(query, spec, meta)).await?;
        for r in related.iter_mut() {
            target.schema().redact(r);
        }
        related
    };
    for doc in docs.iter_mut() {
        let local = lookup(doc, &def.local_field).cloned().unwrap_or(Value::Null);
        let mut matched = related
            .iter()
            .filter(|r| lookup(r, &def.foreign_field).map_or(false, |fv| loosely_equal(fv, &local)))
            .cloned();
        let value = if def.just_one {
            matched.next().unwrap_or(Value::Null)
        } else {
            Value::Array(matched.collect())
        };
        if let Value::Object(m) = doc {
            m.insert(def.name.clone(), value);
        }
    }
    Ok(())
}

/// Equality across arrays and scalar representations (`"01"` vs `"01"`, `1` vs `"1"`).
fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Array(items), other) | (other, Value::Array(items)) => items.iter().any(|i| loosely_equal(i, other)),
        _ => object_id(a).is_some() && object_id(a) == object_id(b),
    }
}
