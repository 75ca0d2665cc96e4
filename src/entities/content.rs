//! Demo content entities.

use crate::schema::{EntitySchema, FieldDef};

pub fn todo() -> EntitySchema {
    EntitySchema::new("Todo")
        .field(FieldDef::string("title").required())
        .field(FieldDef::string("content").required())
        .field(FieldDef::reference("comments", "Comment").array())
        .timestamps()
}

pub fn comment() -> EntitySchema {
    EntitySchema::new("Comment")
        .field(FieldDef::string("user").required())
        .field(FieldDef::string("text").required())
        .timestamps()
}
