//! Catalogue and stock entities.

use crate::case::{slugify, slugify_unique};
use crate::schema::{EntitySchema, FieldDef, PopulateDef};
use serde_json::{json, Map, Value};

pub const STATUS_DRAFT: &str = "draft";
pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_CANCEL: &str = "cancel";
pub const TYPE_IMPORT: &str = "import";
pub const TYPE_EXPORT: &str = "export";

fn name_slug(doc: &Map<String, Value>) -> Value {
    doc.get("name")
        .and_then(Value::as_str)
        .map(|n| json!(slugify(n)))
        .unwrap_or(Value::Null)
}

fn unique_name_slug(doc: &Map<String, Value>) -> Value {
    doc.get("name")
        .and_then(Value::as_str)
        .map(|n| json!(slugify_unique(n)))
        .unwrap_or(Value::Null)
}

fn price(doc: &Map<String, Value>) -> Value {
    doc.get("price").cloned().unwrap_or(Value::Null)
}

pub fn product_attribute() -> EntitySchema {
    EntitySchema::new("ProductAttribute")
        .field(FieldDef::string("name").required().unique())
        .field(FieldDef::string("code").computed_default(name_slug))
        .field(FieldDef::string("description"))
        .field(FieldDef::string("values").array().required().default_value(json!([])))
        .field(FieldDef::reference("createdBy", "User"))
        .field(FieldDef::reference("updatedBy", "User"))
        .text_index(&["name"])
}

pub fn product_category() -> EntitySchema {
    EntitySchema::new("ProductCategory")
        .field(FieldDef::string("name").required())
        .field(FieldDef::string("slug").unique().computed_default(name_slug))
        .field(FieldDef::string("description"))
        .field(FieldDef::reference("parent", "ProductCategory"))
        .field(FieldDef::number("productCounts").default_value(json!(0)))
        .field(FieldDef::number("order").default_value(json!(0)))
        .timestamps()
        .text_index(&["name"])
        .virtual_populate(PopulateDef::new("children", "ProductCategory", "id", "parent"))
}

pub fn warehouse() -> EntitySchema {
    EntitySchema::new("Warehouse")
        .field(FieldDef::string("name").required())
        .field(FieldDef::reference("address", "Address"))
        .field(FieldDef::boolean("isPrimary"))
        .owner()
        .text_index(&["name"])
}

pub fn product() -> EntitySchema {
    EntitySchema::new("Product")
        .field(FieldDef::string("name").required().unique())
        .field(FieldDef::string("code").required().unique())
        .field(FieldDef::string("slug").computed_default(unique_name_slug))
        .field(FieldDef::string("image").required())
        .field(FieldDef::string("images").array().default_value(json!([])))
        .field(
            FieldDef::string("tags")
                .array()
                .one_of(&["new", "new_seal", "secondhande"])
                .default_value(json!([])),
        )
        .field(FieldDef::mixed("attributes").array().default_value(json!([])))
        .field(FieldDef::boolean("hasVariants").default_value(json!(false)))
        .field(FieldDef::mixed("variantAttributes").array().default_value(json!([])))
        .field(FieldDef::reference("categories", "ProductCategory").array().default_value(json!([])))
        // Quantity shown to shoppers; real stock is `inStock`.
        .field(FieldDef::number("quantity").default_value(json!(0)))
        .field(FieldDef::mixed("statistics").default_value(json!({ "solds": 0, "likes": 0 })))
        .field(FieldDef::number("price"))
        .field(FieldDef::number("importPrice").computed_default(price))
        .field(FieldDef::number("exportPrice").computed_default(price))
        .field(FieldDef::boolean("onSale").default_value(json!(false)))
        .field(FieldDef::number("saleValue").default_value(json!(0)))
        .field(
            FieldDef::string("saleType")
                .one_of(&["absolute", "percent"])
                .default_value(json!("absolute")),
        )
        .field(FieldDef::reference("parent", "Product"))
        .owner()
        .virtual_populate(PopulateDef::new("children", "Product", "id", "parent"))
        .virtual_populate(PopulateDef::new("inventories", "Inventory", "id", "product"))
}

pub fn inventory() -> EntitySchema {
    EntitySchema::new("Inventory")
        .field(FieldDef::reference("product", "Product").required())
        .field(FieldDef::reference("warehouse", "Warehouse").required())
        .field(FieldDef::number("quantity").required().default_value(json!(0)))
}

pub fn invoice() -> EntitySchema {
    EntitySchema::new("Invoice")
        .field(FieldDef::number("price").required())
        .field(FieldDef::reference("product", "Product").required())
        .field(FieldDef::number("quantity").required().min(0.0))
        .field(FieldDef::reference("warehouse", "Warehouse").required())
        .field(
            FieldDef::string("status")
                .required()
                .one_of(&[STATUS_DRAFT, STATUS_SUCCESS, STATUS_CANCEL]),
        )
        .field(FieldDef::string("type").required().one_of(&[TYPE_IMPORT, TYPE_EXPORT]))
        .field(FieldDef::mixed("histories").array().default_value(json!([])))
        .owner()
        .timestamps()
}
