//! Entity lifecycle hooks.

use super::warehouse::{STATUS_CANCEL, STATUS_SUCCESS, TYPE_IMPORT};
use crate::error::AppError;
use crate::query::QueryContext;
use crate::repository::{object_id, Catalog, Operation, Repository, WriteRequest};
use crate::service::{Hook, HookContext};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

/// Plain fields of a write payload: the `$set` document of an operator update,
/// otherwise the payload itself.
fn plain_fields(data: &mut Value) -> Option<&mut Map<String, Value>> {
    let is_operator = data
        .as_object()
        .map_or(false, |m| m.keys().any(|k| k.starts_with('$')));
    let m = data.as_object_mut()?;
    if is_operator {
        let set = m.entry("$set").or_insert_with(|| json!({}));
        set.as_object_mut()
    } else {
        Some(m)
    }
}

/// Stamps `createdBy` on creates and `updatedBy` on updates with the acting user.
pub struct OwnerStamp;

#[async_trait]
impl Hook for OwnerStamp {
    fn name(&self) -> &str {
        "owner-stamp"
    }

    fn operations(&self) -> &[Operation] {
        &[Operation::Create, Operation::CreateMany, Operation::Update, Operation::UpdateOne]
    }

    async fn before(&self, _repo: &dyn Repository, ctx: &mut HookContext) -> Result<(), AppError> {
        let Some(user_id) = ctx.meta.user_id().map(String::from) else {
            return Ok(());
        };
        match ctx.operation {
            Operation::Create => {
                if let Some(m) = ctx.data.as_object_mut() {
                    m.insert("createdBy".into(), json!(user_id));
                }
            }
            Operation::CreateMany => {
                if let Some(items) = ctx.data.as_array_mut() {
                    for m in items.iter_mut().filter_map(Value::as_object_mut) {
                        m.insert("createdBy".into(), json!(user_id));
                    }
                }
            }
            _ => {
                if let Some(m) = plain_fields(&mut ctx.data) {
                    m.insert("updatedBy".into(), json!(user_id));
                }
            }
        }
        Ok(())
    }
}

/// Keeps `Address.text` as "street, ward, district, province".
pub struct AddressText {
    catalog: Catalog,
}

impl AddressText {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }

    async fn location_name(&self, code: Option<&Value>, kind: &str) -> Result<Option<String>, AppError> {
        let Some(code) = code.and_then(object_id) else {
            return Ok(None);
        };
        let mut query = Map::new();
        query.insert("code".into(), json!(code));
        query.insert("type".into(), json!(kind));
        let found = self.catalog.get("Location")?.find_one(QueryContext::new(query)).await?;
        Ok(found.and_then(|l| l.get("name").and_then(Value::as_str).map(String::from)))
    }

    async fn text_for(&self, address: &Map<String, Value>) -> Result<String, AppError> {
        let street = address.get("street").and_then(Value::as_str).map(String::from);
        let ward = self.location_name(address.get("wardCode"), "ward").await?;
        let district = self.location_name(address.get("districtCode"), "district").await?;
        let province = self.location_name(address.get("provinceCode"), "province").await?;
        Ok([street, ward, district, province]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "))
    }
}

const ADDRESS_PARTS: [&str; 4] = ["street", "wardCode", "districtCode", "provinceCode"];

#[async_trait]
impl Hook for AddressText {
    fn name(&self) -> &str {
        "address-text"
    }

    fn operations(&self) -> &[Operation] {
        &[Operation::Create, Operation::CreateMany, Operation::Update, Operation::UpdateOne]
    }

    async fn before(&self, _repo: &dyn Repository, ctx: &mut HookContext) -> Result<(), AppError> {
        if let Some(items) = ctx.data.as_array_mut() {
            for m in items.iter_mut().filter_map(Value::as_object_mut) {
                let text = self.text_for(m).await?;
                m.insert("text".into(), json!(text));
            }
            return Ok(());
        }
        let Some(m) = plain_fields(&mut ctx.data) else {
            return Ok(());
        };
        if !ADDRESS_PARTS.iter().any(|k| m.contains_key(*k)) {
            return Ok(());
        }
        let text = self.text_for(m).await?;
        m.insert("text".into(), json!(text));
        Ok(())
    }
}

/// Refuses updates to missing invoices and updates that cancel an invoice.
pub struct InvoiceGuard;

#[async_trait]
impl Hook for InvoiceGuard {
    fn name(&self) -> &str {
        "invoice-guard"
    }

    fn operations(&self) -> &[Operation] {
        &[Operation::UpdateOne]
    }

    async fn before(&self, repo: &dyn Repository, ctx: &mut HookContext) -> Result<(), AppError> {
        let existing = repo.find_one(QueryContext::new(ctx.query.clone())).await?;
        if existing.is_none() {
            return Err(AppError::not_found("Invoice not found"));
        }
        let status = ctx
            .data
            .get("status")
            .or_else(|| ctx.data.get("$set").and_then(|s| s.get("status")));
        if status.and_then(Value::as_str) == Some(STATUS_CANCEL) {
            return Err(AppError::bad_request("Cannot update invoice"));
        }
        Ok(())
    }
}

/// On a status change to `success`, moves stock on the product and its inventory
/// row, then records the change in the invoice history.
pub struct InvoiceStock {
    catalog: Catalog,
}

impl InvoiceStock {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }

    async fn move_stock(&self, invoice: &Value) -> Result<(), AppError> {
        let quantity = invoice.get("quantity").and_then(Value::as_f64).unwrap_or(0.0).abs();
        let delta = if invoice.get("type").and_then(Value::as_str) == Some(TYPE_IMPORT) {
            quantity
        } else {
            -quantity
        };
        let product = invoice
            .get("product")
            .and_then(object_id)
            .ok_or_else(|| AppError::bad_request("invoice has no product"))?;
        let warehouse = invoice.get("warehouse").and_then(object_id);

        let inventories = self.catalog.get("Inventory")?;
        let mut by_product = Map::new();
        by_product.insert("product".into(), json!(product));
        let row = inventories.find_one(QueryContext::new(by_product.clone())).await?;
        if row.is_none() {
            inventories
                .create(WriteRequest::new(json!({
                    "product": product,
                    "warehouse": warehouse,
                    "quantity": delta,
                })))
                .await?;
        } else {
            inventories
                .update_one(WriteRequest::new(json!({ "$inc": { "quantity": delta } })).with_query(by_product))
                .await?;
        }

        let mut by_id = Map::new();
        by_id.insert("id".into(), json!(product));
        self.catalog
            .get("Product")?
            .update_one(WriteRequest::new(json!({ "$inc": { "quantity": delta } })).with_query(by_id))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Hook for InvoiceStock {
    fn name(&self) -> &str {
        "invoice-stock"
    }

    fn operations(&self) -> &[Operation] {
        &[Operation::Create, Operation::UpdateOne]
    }

    async fn after(&self, repo: &dyn Repository, ctx: &HookContext, result: Value) -> Result<Value, AppError> {
        let Some(id) = result.get("id").and_then(object_id) else {
            return Ok(result);
        };
        let status = result.get("status").cloned().unwrap_or(Value::Null);
        let last = result
            .get("histories")
            .and_then(Value::as_array)
            .and_then(|h| h.last())
            .and_then(|h| h.get("status"))
            .cloned()
            .unwrap_or(Value::Null);
        if last == status {
            return Ok(result);
        }
        if status.as_str() == Some(STATUS_SUCCESS) {
            self.move_stock(&result).await?;
        }
        tracing::debug!(invoice = %id, status = %status, "invoice status changed");
        let mut by_id = Map::new();
        by_id.insert("id".into(), json!(id));
        let entry = json!({
            "status": status,
            "createdAt": chrono::Utc::now().to_rfc3339(),
            "createdBy": ctx.meta.user_id(),
        });
        let updated = repo
            .update_one(
                WriteRequest::new(json!({ "$push": { "histories": entry } }))
                    .with_query(by_id)
                    .with_populates(ctx.populates.clone())
                    .with_meta(ctx.meta.clone()),
            )
            .await?;
        Ok(updated.unwrap_or(result))
    }
}

/// Creates the variants sent as `children` alongside a new product.
pub struct ProductChildren;

#[async_trait]
impl Hook for ProductChildren {
    fn name(&self) -> &str {
        "product-children"
    }

    fn operations(&self) -> &[Operation] {
        &[Operation::Create]
    }

    async fn before(&self, _repo: &dyn Repository, ctx: &mut HookContext) -> Result<(), AppError> {
        if let Some(children) = ctx.data.as_object_mut().and_then(|m| m.remove("children")) {
            ctx.scratch.insert("children".into(), children);
        }
        Ok(())
    }

    async fn after(&self, repo: &dyn Repository, ctx: &HookContext, result: Value) -> Result<Value, AppError> {
        let Some(Value::Array(children)) = ctx.scratch.get("children") else {
            return Ok(result);
        };
        let Some(id) = result.get("id").and_then(object_id) else {
            return Ok(result);
        };
        if children.is_empty() {
            return Ok(result);
        }
        let code = result.get("code").and_then(Value::as_str).unwrap_or_default();
        let categories: Vec<Value> = result
            .get("categories")
            .and_then(Value::as_array)
            .map(|c| c.iter().filter_map(object_id).map(Value::String).collect())
            .unwrap_or_default();
        let variants: Vec<Value> = children
            .iter()
            .enumerate()
            .map(|(i, child)| {
                let mut v = child.as_object().cloned().unwrap_or_default();
                if let Some(Value::Array(attrs)) = v.get_mut("variantAttributes") {
                    for a in attrs.iter_mut().filter_map(Value::as_object_mut) {
                        if let Some(attr) = a.get("attribute").and_then(object_id) {
                            a.insert("attribute".into(), json!(attr));
                        }
                    }
                }
                v.insert("code".into(), json!(format!("{}-{}", code, i + 1)));
                if v.get("image").map_or(true, Value::is_null) {
                    v.insert("image".into(), result.get("image").cloned().unwrap_or(Value::Null));
                }
                v.insert("parent".into(), json!(id));
                v.insert("categories".into(), Value::Array(categories.clone()));
                Value::Object(v)
            })
            .collect();

        let created = repo
            .create_many(WriteRequest::new(Value::Array(variants)).with_meta(ctx.meta.clone()))
            .await;
        if let Err(e) = created {
            tracing::warn!(product = %id, error = %e, "variant creation failed; removing parent");
            let mut by_id = Map::new();
            by_id.insert("id".into(), json!(id));
            repo.delete(WriteRequest::filter(by_id)).await?;
            return Err(e);
        }
        let found = repo
            .find_one(QueryContext::by_id(&id).with_populates(vec![json!("children")]))
            .await?;
        Ok(found.unwrap_or(result))
    }
}

/// `inStock` is the sum of the populated inventory quantities.
pub struct ProductStock;

fn set_in_stock(doc: &mut Value) {
    let Some(m) = doc.as_object_mut() else { return };
    let Some(Value::Array(rows)) = m.get("inventories") else { return };
    let total: f64 = rows
        .iter()
        .filter_map(|r| r.get("quantity").and_then(Value::as_f64))
        .sum();
    m.insert("inStock".into(), json!(total));
}

#[async_trait]
impl Hook for ProductStock {
    fn name(&self) -> &str {
        "product-stock"
    }

    fn operations(&self) -> &[Operation] {
        &[Operation::List, Operation::Find, Operation::FindOne]
    }

    async fn after(&self, _repo: &dyn Repository, _ctx: &HookContext, mut result: Value) -> Result<Value, AppError> {
        match &mut result {
            Value::Array(docs) => docs.iter_mut().for_each(set_in_stock),
            doc => set_in_stock(doc),
        }
        Ok(result)
    }
}
