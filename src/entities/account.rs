//! Account entities: locations, addresses, users, roles, settings, media.

use crate::schema::{EntitySchema, FieldDef, PopulateDef};
use serde_json::json;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_STAFF: &str = "staff";
pub const ROLE_CUSTOMER: &str = "customer";

pub fn location() -> EntitySchema {
    EntitySchema::new("Location")
        .field(FieldDef::string("code").required())
        .field(FieldDef::string("name"))
        .field(FieldDef::string("provinceCode"))
        .field(FieldDef::string("districtCode"))
        .field(FieldDef::string("wardCode"))
        .field(FieldDef::string("type").required().one_of(&["province", "district", "ward"]))
        .text_index(&["name"])
}

fn location_of(name: &str, local: &str, kind: &str) -> PopulateDef {
    PopulateDef::new(name, "Location", local, "code")
        .just_one()
        .matching("type", json!(kind))
}

pub fn address() -> EntitySchema {
    EntitySchema::new("Address")
        .field(FieldDef::string("provinceCode"))
        .field(FieldDef::string("districtCode"))
        .field(FieldDef::string("wardCode"))
        .field(FieldDef::string("street"))
        // Derived from street and location names on every write.
        .field(FieldDef::string("text"))
        .field(FieldDef::boolean("isPrimary"))
        .field(FieldDef::string("name"))
        .field(FieldDef::string("phone"))
        .owner()
        .virtual_populate(location_of("province", "provinceCode", "province"))
        .virtual_populate(location_of("district", "districtCode", "district"))
        .virtual_populate(location_of("ward", "wardCode", "ward"))
}

pub fn user() -> EntitySchema {
    EntitySchema::new("User")
        .field(FieldDef::string("username").unique())
        .field(FieldDef::string("password").required().sensitive())
        .field(FieldDef::string("email"))
        .field(FieldDef::string("phone"))
        .field(FieldDef::string("facebookId"))
        .field(FieldDef::boolean("blocked").default_value(json!(false)))
        .field(FieldDef::boolean("isAdmin").default_value(json!(false)))
        .field(FieldDef::mixed("profile").default_value(json!({})))
        .field(FieldDef::reference("roles", "Role").array().default_value(json!([])))
}

pub fn role() -> EntitySchema {
    EntitySchema::new("Role")
        .field(FieldDef::string("name").required())
        .field(FieldDef::string("code").required().unique())
}

/// Application-wide key/value flags such as `inited_app`.
pub fn config() -> EntitySchema {
    EntitySchema::new("Config")
        .field(FieldDef::string("key"))
        .field(FieldDef::mixed("value"))
}

pub fn media() -> EntitySchema {
    EntitySchema::new("Media")
        .field(FieldDef::string("name"))
        .field(FieldDef::string("src"))
        .field(FieldDef::string("path"))
        .field(FieldDef::mixed("meta"))
        .field(FieldDef::string("type").one_of(&["local", "external"]))
        .owner()
        .timestamps()
        .text_index(&["name"])
}
