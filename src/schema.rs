//! Entity schema definitions: fields, constraints, defaults, virtual populates.

use serde_json::{json, Map, Value};

/// Storage kind of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Date,
    ObjectId,
    Mixed,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String => "String",
            FieldKind::Number => "Number",
            FieldKind::Boolean => "Boolean",
            FieldKind::Date => "Date",
            FieldKind::ObjectId => "ObjectId",
            FieldKind::Mixed => "Mixed",
        }
    }
}

/// Default computed from the document being created.
pub type ComputedDefault = fn(&Map<String, Value>) -> Value;

#[derive(Clone)]
pub enum FieldDefault {
    Value(Value),
    Computed(ComputedDefault),
}

#[derive(Clone)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    pub array: bool,
    pub reference: Option<String>,
    pub required: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub enum_values: Option<Vec<Value>>,
    pub pattern: Option<String>,
    pub default: Option<FieldDefault>,
    pub unique: bool,
    /// Never returned to clients.
    pub sensitive: bool,
}

impl FieldDef {
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            array: false,
            reference: None,
            required: false,
            min: None,
            max: None,
            min_length: None,
            max_length: None,
            enum_values: None,
            pattern: None,
            default: None,
            unique: false,
            sensitive: false,
        }
    }

    pub fn string(name: &str) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub fn number(name: &str) -> Self {
        Self::new(name, FieldKind::Number)
    }

    pub fn boolean(name: &str) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn date(name: &str) -> Self {
        Self::new(name, FieldKind::Date)
    }

    pub fn mixed(name: &str) -> Self {
        Self::new(name, FieldKind::Mixed)
    }

    pub fn reference(name: &str, entity: &str) -> Self {
        let mut f = Self::new(name, FieldKind::ObjectId);
        f.reference = Some(entity.to_string());
        f
    }

    pub fn array(mut self) -> Self {
        self.array = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn min(mut self, v: f64) -> Self {
        self.min = Some(v);
        self
    }

    pub fn max(mut self, v: f64) -> Self {
        self.max = Some(v);
        self
    }

    pub fn min_length(mut self, n: usize) -> Self {
        self.min_length = Some(n);
        self
    }

    pub fn max_length(mut self, n: usize) -> Self {
        self.max_length = Some(n);
        self
    }

    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.enum_values = Some(values.iter().map(|v| json!(v)).collect());
        self
    }

    pub fn pattern(mut self, re: &str) -> Self {
        self.pattern = Some(re.to_string());
        self
    }

    pub fn default_value(mut self, v: Value) -> Self {
        self.default = Some(FieldDefault::Value(v));
        self
    }

    pub fn computed_default(mut self, f: ComputedDefault) -> Self {
        self.default = Some(FieldDefault::Computed(f));
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Reflected description served by the schema endpoint.
    pub fn describe(&self) -> Value {
        let mut out = Map::new();
        let kind = if self.array { "Array" } else { self.kind.as_str() };
        out.insert("type".into(), json!(kind));
        if let Some(r) = &self.reference {
            out.insert("ref".into(), json!(r));
        }
        if self.required {
            out.insert("required".into(), json!(true));
        }
        if let Some(v) = self.max {
            out.insert("max".into(), json!(v));
        }
        if let Some(v) = self.min {
            out.insert("min".into(), json!(v));
        }
        if let Some(v) = self.max_length {
            out.insert("maxlength".into(), json!(v));
        }
        if let Some(v) = self.min_length {
            out.insert("minlength".into(), json!(v));
        }
        if let Some(v) = &self.enum_values {
            out.insert("enum".into(), Value::Array(v.clone()));
        }
        if let Some(FieldDefault::Value(v)) = &self.default {
            out.insert("default".into(), v.clone());
        }
        if self.unique {
            out.insert("unique".into(), json!(true));
        }
        Value::Object(out)
    }
}

/// Virtual relation resolved at read time by matching `local_field` against
/// `foreign_field` on the referenced entity.
#[derive(Clone, Debug)]
pub struct PopulateDef {
    pub name: String,
    pub reference: String,
    pub local_field: String,
    pub foreign_field: String,
    pub just_one: bool,
    pub filter: Map<String, Value>,
}

impl PopulateDef {
    pub fn new(name: &str, reference: &str, local_field: &str, foreign_field: &str) -> Self {
        Self {
            name: name.to_string(),
            reference: reference.to_string(),
            local_field: local_field.to_string(),
            foreign_field: foreign_field.to_string(),
            just_one: false,
            filter: Map::new(),
        }
    }

    pub fn just_one(mut self) -> Self {
        self.just_one = true;
        self
    }

    pub fn matching(mut self, key: &str, value: Value) -> Self {
        self.filter.insert(key.to_string(), value);
        self
    }
}

/// Fields every stored document may carry regardless of schema.
const SYSTEM_FIELDS: &[&str] = &["id", "createdAt", "updatedAt", "deletedAt"];

#[derive(Clone)]
pub struct EntitySchema {
    /// Entity name; also the collection name and the reference target name.
    pub name: String,
    pub fields: Vec<FieldDef>,
    /// Stamp `createdBy` / `updatedBy` from the requesting user.
    pub owner: bool,
    pub timestamps: bool,
    /// Fields searched by `$text`; empty means every string field.
    pub text_fields: Vec<String>,
    pub virtuals: Vec<PopulateDef>,
}

impl EntitySchema {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: Vec::new(),
            owner: false,
            timestamps: false,
            text_fields: Vec::new(),
            virtuals: Vec::new(),
        }
    }

    pub fn field(mut self, f: FieldDef) -> Self {
        self.fields.push(f);
        self
    }

    /// Adds `createdBy` / `updatedBy` user references when absent.
    pub fn owner(mut self) -> Self {
        self.owner = true;
        for name in ["createdBy", "updatedBy"] {
            if self.get(name).is_none() {
                self.fields.push(FieldDef::reference(name, "User"));
            }
        }
        self
    }

    pub fn timestamps(mut self) -> Self {
        self.timestamps = true;
        self
    }

    pub fn text_index(mut self, fields: &[&str]) -> Self {
        self.text_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn virtual_populate(mut self, def: PopulateDef) -> Self {
        self.virtuals.push(def);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn virtual_def(&self, name: &str) -> Option<&PopulateDef> {
        self.virtuals.iter().find(|v| v.name == name)
    }

    pub fn unique_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.unique)
    }

    /// True when `path` (possibly dotted) targets a declared or system field.
    pub fn is_known(&self, path: &str) -> bool {
        let root = path.split('.').next().unwrap_or(path);
        SYSTEM_FIELDS.contains(&root) || self.get(root).is_some()
    }

    /// Field name to description, in declaration order of the store's map.
    pub fn describe(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), f.describe()))
            .collect()
    }

    /// Fills missing fields that declare a default. Static defaults first, then
    /// computed ones so they can read the static values.
    pub fn apply_defaults(&self, doc: &mut Map<String, Value>) {
        for f in &self.fields {
            if let Some(FieldDefault::Value(v)) = &f.default {
                if doc.get(&f.name).map_or(true, Value::is_null) {
                    doc.insert(f.name.clone(), v.clone());
                }
            }
        }
        for f in &self.fields {
            if let Some(FieldDefault::Computed(compute)) = &f.default {
                if doc.get(&f.name).map_or(true, Value::is_null) {
                    let v = compute(doc);
                    if !v.is_null() {
                        doc.insert(f.name.clone(), v);
                    }
                }
            }
        }
    }

    /// Drops top-level keys that are neither declared nor system fields.
    pub fn retain_known(&self, doc: &mut Map<String, Value>) {
        doc.retain(|k, _| self.is_known(k));
    }

    /// Casts scalar values to the declared kind where the conversion is lossless.
    pub fn cast(&self, doc: &mut Map<String, Value>) {
        for f in &self.fields {
            if let Some(v) = doc.get_mut(&f.name) {
                if f.array {
                    if let Value::Array(items) = v {
                        for item in items.iter_mut() {
                            cast_scalar(f.kind, item);
                        }
                    }
                } else {
                    cast_scalar(f.kind, v);
                }
            }
        }
    }

    /// Removes sensitive fields from a document or an array of documents.
    pub fn redact(&self, value: &mut Value) {
        match value {
            Value::Object(m) => {
                for f in self.fields.iter().filter(|f| f.sensitive) {
                    m.remove(&f.name);
                }
            }
            Value::Array(items) => {
                for item in items.iter_mut() {
                    self.redact(item);
                }
            }
            _ => {}
        }
    }
}

fn cast_scalar(kind: FieldKind, v: &mut Value) {
    match (kind, &*v) {
        (FieldKind::String, Value::Number(n)) => *v = Value::String(n.to_string()),
        (FieldKind::String, Value::Bool(b)) => *v = Value::String(b.to_string()),
        (FieldKind::Number, Value::String(s)) => {
            if let Ok(i) = s.trim().parse::<i64>() {
                *v = json!(i);
            } else if let Ok(f) = s.trim().parse::<f64>() {
                if f.is_finite() {
                    *v = json!(f);
                }
            }
        }
        (FieldKind::Boolean, Value::String(s)) => match s.as_str() {
            "true" => *v = Value::Bool(true),
            "false" => *v = Value::Bool(false),
            _ => {}
        },
        (FieldKind::ObjectId, Value::Object(m)) => {
            if let Some(Value::String(id)) = m.get("id") {
                *v = Value::String(id.clone());
            }
        }
        _ => {}
    }
}
