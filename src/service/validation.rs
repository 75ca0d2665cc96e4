//! Entity validation from schema field rules.

use crate::error::FieldError;
use crate::repository::{ValidationMode, ValidationResult};
use crate::schema::{EntitySchema, FieldDef, FieldKind};
use regex::Regex;
use serde_json::{Map, Value};

pub struct EntityValidator;

impl EntityValidator {
    /// Validate a write payload. Full mode enforces required fields; partial mode
    /// checks only what is present and looks inside `$set` for operator updates.
    pub fn validate(schema: &EntitySchema, data: &Value, mode: ValidationMode) -> ValidationResult {
        let Some(body) = data.as_object() else {
            return ValidationResult::from_errors(vec![FieldError::new("data", "data must be an object")]);
        };
        let mut errors = Vec::new();
        match mode {
            ValidationMode::Full => {
                for f in &schema.fields {
                    let val = body.get(&f.name).filter(|v| !v.is_null());
                    match val {
                        None if f.required && f.default.is_none() => {
                            errors.push(FieldError::new(&f.name, format!("{} is required", f.name)));
                        }
                        None => {}
                        Some(v) => validate_field(f, v, &mut errors),
                    }
                }
            }
            ValidationMode::Partial => {
                if body.keys().any(|k| k.starts_with('$')) {
                    if let Some(Value::Object(set)) = body.get("$set") {
                        validate_present(schema, set, &mut errors);
                    }
                } else {
                    validate_present(schema, body, &mut errors);
                }
            }
        }
        ValidationResult::from_errors(errors)
    }
}

fn validate_present(schema: &EntitySchema, body: &Map<String, Value>, errors: &mut Vec<FieldError>) {
    for (key, v) in body {
        let Some(f) = schema.get(key) else { continue };
        if v.is_null() {
            if f.required {
                errors.push(FieldError::new(&f.name, format!("{} is required", f.name)));
            }
            continue;
        }
        validate_field(f, v, errors);
    }
}

fn validate_field(f: &FieldDef, v: &Value, errors: &mut Vec<FieldError>) {
    if f.array {
        let Some(items) = v.as_array() else {
            errors.push(FieldError::new(&f.name, format!("{} must be an array", f.name)));
            return;
        };
        for item in items {
            if let Some(e) = check_value(f, item) {
                errors.push(e);
                return;
            }
        }
        return;
    }
    if let Some(e) = check_value(f, v) {
        errors.push(e);
    }
}

/// Type and constraint checks for one scalar value. Returns the first failure.
fn check_value(f: &FieldDef, v: &Value) -> Option<FieldError> {
    let col = f.name.as_str();
    let fail = |msg: String| Some(FieldError::new(col, msg));
    if !kind_matches(f.kind, v) {
        return fail(format!("{} must be {}", col, kind_label(f.kind)));
    }
    if let Some(max) = f.max_length {
        if let Some(s) = v.as_str() {
            if s.chars().count() > max {
                return fail(format!("{} must be at most {} characters", col, max));
            }
        }
    }
    if let Some(min) = f.min_length {
        if let Some(s) = v.as_str() {
            if s.chars().count() < min {
                return fail(format!("{} must be at least {} characters", col, min));
            }
        }
    }
    if let Some(ref pattern) = f.pattern {
        match Regex::new(pattern) {
            Err(_) => return fail(format!("invalid pattern for {}", col)),
            Ok(re) => {
                if let Some(s) = v.as_str() {
                    if !re.is_match(s) {
                        return fail(format!("{} does not match required pattern", col));
                    }
                }
            }
        }
    }
    if let Some(ref allowed) = f.enum_values {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            let listed = allowed
                .iter()
                .map(|a| a.as_str().map(String::from).unwrap_or_else(|| a.to_string()))
                .collect::<Vec<_>>()
                .join(", ");
            return fail(format!("{} must be one of: {}", col, listed));
        }
    }
    if let Some(min) = f.min {
        if let Some(n) = as_number(v) {
            if n < min {
                return fail(format!("{} must be at least {}", col, min));
            }
        }
    }
    if let Some(max) = f.max {
        if let Some(n) = as_number(v) {
            if n > max {
                return fail(format!("{} must be at most {}", col, max));
            }
        }
    }
    None
}

fn kind_matches(kind: FieldKind, v: &Value) -> bool {
    match kind {
        FieldKind::Mixed => true,
        FieldKind::String => v.is_string() || v.is_number() || v.is_boolean(),
        FieldKind::Number => as_number(v).is_some(),
        FieldKind::Boolean => v.is_boolean() || matches!(v.as_str(), Some("true") | Some("false")),
        FieldKind::Date => match v {
            Value::Number(_) => true,
            Value::String(s) => is_date(s),
            _ => false,
        },
        FieldKind::ObjectId => match v {
            Value::String(s) => !s.trim().is_empty(),
            Value::Object(m) => m.get("id").map_or(false, Value::is_string),
            _ => false,
        },
    }
}

fn kind_label(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::String => "a string",
        FieldKind::Number => "a number",
        FieldKind::Boolean => "a boolean",
        FieldKind::Date => "a date",
        FieldKind::ObjectId => "an id reference",
        FieldKind::Mixed => "a value",
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn is_date(s: &str) -> bool {
    chrono::DateTime::parse_from_rfc3339(s).is_ok()
        || chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), Value::String(t)) => s == t,
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}
