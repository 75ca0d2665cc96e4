//! Filter, update, projection and sort semantics over JSON documents.
//!
//! `MemoryStore` evaluates these directly; `PgStore` translates filters to SQL
//! and reuses [`apply_update`] for read-modify-write.

use super::SortOrder;
use crate::error::AppError;
use regex::RegexBuilder;
use serde_json::{json, Map, Value};
use std::cmp::Ordering;

/// Resolve a dotted path inside a document.
pub fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |cur, seg| match cur {
        Value::Object(m) => m.get(seg),
        Value::Array(items) => seg.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

pub fn matches(doc: &Value, filter: &Map<String, Value>, text_fields: &[String]) -> Result<bool, AppError> {
    for (key, cond) in filter {
        let ok = match key.as_str() {
            "$and" => {
                let mut all = true;
                for f in sub_filters(key, cond)? {
                    if !matches(doc, f, text_fields)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for f in sub_filters(key, cond)? {
                    if matches(doc, f, text_fields)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$nor" => {
                let mut none = true;
                for f in sub_filters(key, cond)? {
                    if matches(doc, f, text_fields)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            "$text" => {
                let search = cond
                    .get("$search")
                    .and_then(Value::as_str)
                    .ok_or_else(|| AppError::bad_request("$text requires a $search string"))?;
                text_match(doc, search, text_fields)
            }
            k if k.starts_with('$') => {
                return Err(AppError::bad_request(format!("unsupported query operator {}", k)));
            }
            path => match_field(lookup(doc, path), cond)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Operands of `$and` / `$or` / `$nor`.
pub fn sub_filters<'a>(op: &str, cond: &'a Value) -> Result<Vec<&'a Map<String, Value>>, AppError> {
    let items = cond
        .as_array()
        .ok_or_else(|| AppError::bad_request(format!("{} requires an array", op)))?;
    items
        .iter()
        .map(|f| {
            f.as_object()
                .ok_or_else(|| AppError::bad_request(format!("{} entries must be objects", op)))
        })
        .collect()
}

/// True when `cond` is an operator document such as `{"$gt": 1}`.
pub fn is_operator_doc(cond: &Value) -> bool {
    cond.as_object()
        .and_then(|m| m.keys().next())
        .map_or(false, |k| k.starts_with('$'))
}

fn match_field(actual: Option<&Value>, cond: &Value) -> Result<bool, AppError> {
    let Some(ops) = cond.as_object().filter(|_| is_operator_doc(cond)) else {
        return Ok(eq_match(actual, cond));
    };
    for (op, operand) in ops {
        let ok = match op.as_str() {
            "$eq" => eq_match(actual, operand),
            "$ne" => !eq_match(actual, operand),
            "$gt" | "$gte" | "$lt" | "$lte" => cmp_match(actual, op, operand),
            "$in" => in_list(op, operand)?.iter().any(|x| eq_match(actual, x)),
            "$nin" => !in_list(op, operand)?.iter().any(|x| eq_match(actual, x)),
            "$exists" => truthy(operand) == actual.is_some(),
            "$regex" => regex_match(actual, operand, ops.get("$options"))?,
            "$options" => true,
            "$not" => !match_field(actual, operand)?,
            "$size" => match (actual, operand.as_u64()) {
                (Some(Value::Array(items)), Some(n)) => items.len() as u64 == n,
                _ => false,
            },
            other => {
                return Err(AppError::bad_request(format!("unsupported query operator {}", other)));
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn in_list<'a>(op: &str, operand: &'a Value) -> Result<&'a Vec<Value>, AppError> {
    operand
        .as_array()
        .ok_or_else(|| AppError::bad_request(format!("{} requires an array", op)))
}

/// Equality with array membership: an array field matches a scalar it contains.
fn eq_match(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => expected.is_null(),
        Some(Value::Array(items)) if !expected.is_array() => items.iter().any(|i| scalar_eq(i, expected)),
        Some(v) => scalar_eq(v, expected),
    }
}

fn scalar_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn cmp_match(actual: Option<&Value>, op: &str, operand: &Value) -> bool {
    let check = |v: &Value| match compare(v, operand) {
        Some(ord) => match op {
            "$gt" => ord == Ordering::Greater,
            "$gte" => ord != Ordering::Less,
            "$lt" => ord == Ordering::Less,
            _ => ord != Ordering::Greater,
        },
        None => false,
    };
    match actual {
        Some(Value::Array(items)) => items.iter().any(check),
        Some(v) => check(v),
        None => false,
    }
}

/// Ordering between values of the same JSON type.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn regex_match(actual: Option<&Value>, pattern: &Value, options: Option<&Value>) -> Result<bool, AppError> {
    let pattern = pattern
        .as_str()
        .ok_or_else(|| AppError::bad_request("$regex requires a string"))?;
    let insensitive = options
        .and_then(Value::as_str)
        .map_or(false, |o| o.contains('i'));
    let re = RegexBuilder::new(pattern)
        .case_insensitive(insensitive)
        .build()
        .map_err(|e| AppError::bad_request(format!("invalid $regex: {}", e)))?;
    Ok(match actual {
        Some(Value::String(s)) => re.is_match(s),
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).any(|s| re.is_match(s)),
        _ => false,
    })
}

/// Case-insensitive text search. A quoted term matches as a phrase, otherwise
/// any of its words may match.
pub fn text_match(doc: &Value, search: &str, fields: &[String]) -> bool {
    let mut haystacks: Vec<String> = Vec::new();
    let mut collect = |v: &Value| match v {
        Value::String(s) => haystacks.push(s.to_lowercase()),
        Value::Array(items) => haystacks.extend(items.iter().filter_map(Value::as_str).map(str::to_lowercase)),
        _ => {}
    };
    if fields.is_empty() {
        if let Value::Object(m) = doc {
            m.iter().filter(|(k, _)| k.as_str() != "id").for_each(|(_, v)| collect(v));
        }
    } else {
        fields.iter().filter_map(|f| lookup(doc, f)).for_each(&mut collect);
    }
    let search = search.trim();
    if let Some(phrase) = exact_phrase(search) {
        let phrase = phrase.to_lowercase();
        return haystacks.iter().any(|h| h.contains(&phrase));
    }
    search
        .split_whitespace()
        .map(str::to_lowercase)
        .any(|word| haystacks.iter().any(|h| h.contains(&word)))
}

/// Inner text of a `"quoted"` search term.
pub fn exact_phrase(search: &str) -> Option<&str> {
    if search.len() >= 2 && search.starts_with('"') && search.ends_with('"') {
        Some(&search[1..search.len() - 1])
    } else {
        None
    }
}

pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "0" && s != "false",
        _ => true,
    }
}

/// True when an update uses operators rather than a plain replacement object.
pub fn is_operator_update(update: &Map<String, Value>) -> bool {
    update.keys().any(|k| k.starts_with('$'))
}

/// Apply an update document. A plain object is treated as `$set`.
pub fn apply_update(doc: &mut Map<String, Value>, update: &Map<String, Value>) -> Result<(), AppError> {
    if !is_operator_update(update) {
        for (path, v) in update {
            set_path(doc, path, v.clone());
        }
        return Ok(());
    }
    for (op, fields) in update {
        let fields = fields
            .as_object()
            .ok_or_else(|| AppError::bad_request(format!("{} requires an object", op)))?;
        for (path, operand) in fields {
            match op.as_str() {
                "$set" => set_path(doc, path, operand.clone()),
                "$unset" => remove_path(doc, path),
                "$inc" => {
                    let by = operand
                        .as_f64()
                        .ok_or_else(|| AppError::bad_request(format!("$inc on {} requires a number", path)))?;
                    let current = get_path(doc, path).cloned().unwrap_or(json!(0));
                    let next = match (current.as_i64(), operand.as_i64()) {
                        (Some(a), Some(b)) => json!(a + b),
                        _ => {
                            let a = current
                                .as_f64()
                                .ok_or_else(|| AppError::bad_request(format!("$inc on non-numeric field {}", path)))?;
                            json!(a + by)
                        }
                    };
                    set_path(doc, path, next);
                }
                "$push" | "$addToSet" => {
                    let items = match operand.get("$each") {
                        Some(Value::Array(each)) => each.clone(),
                        Some(_) => return Err(AppError::bad_request("$each requires an array")),
                        None => vec![operand.clone()],
                    };
                    let mut arr = match get_path(doc, path) {
                        None | Some(Value::Null) => Vec::new(),
                        Some(Value::Array(a)) => a.clone(),
                        Some(_) => {
                            return Err(AppError::bad_request(format!("{} on non-array field {}", op, path)));
                        }
                    };
                    for item in items {
                        if op == "$push" || !arr.iter().any(|x| scalar_eq(x, &item)) {
                            arr.push(item);
                        }
                    }
                    set_path(doc, path, Value::Array(arr));
                }
                "$pull" => {
                    if let Some(Value::Array(a)) = get_path(doc, path) {
                        let mut kept = Vec::with_capacity(a.len());
                        for x in a {
                            if !match_field(Some(x), operand)? {
                                kept.push(x.clone());
                            }
                        }
                        set_path(doc, path, Value::Array(kept));
                    }
                }
                other => {
                    return Err(AppError::bad_request(format!("unsupported update operator {}", other)));
                }
            }
        }
    }
    Ok(())
}

fn get_path<'a>(doc: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let (first, rest) = match path.split_once('.') {
        Some((f, r)) => (f, Some(r)),
        None => (path, None),
    };
    let v = doc.get(first)?;
    match rest {
        Some(r) => lookup(v, r),
        None => Some(v),
    }
}

pub fn set_path(doc: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            doc.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = doc.entry(head.to_string()).or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(inner) = entry {
                set_path(inner, rest, value);
            }
        }
    }
}

fn remove_path(doc: &mut Map<String, Value>, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Value::Object(inner)) = doc.get_mut(head) {
                remove_path(inner, rest);
            }
        }
    }
}

/// Restrict a document to the requested fields. `projection` is an object of
/// `field: 1|0`; `select` is a string like `"name -code"`, an array, or an object.
pub fn project(doc: Value, projection: Option<&Value>, select: Option<&Value>) -> Value {
    let mut spec: Vec<(String, bool)> = Vec::new();
    for source in [projection, select].into_iter().flatten() {
        match source {
            Value::Object(m) => spec.extend(m.iter().map(|(k, v)| (k.clone(), truthy(v)))),
            Value::String(s) => spec.extend(
                s.split(|c: char| c.is_whitespace() || c == ',')
                    .filter(|t| !t.is_empty())
                    .map(field_toggle),
            ),
            Value::Array(items) => spec.extend(items.iter().filter_map(Value::as_str).map(field_toggle)),
            _ => {}
        }
    }
    if spec.is_empty() {
        return doc;
    }
    let Value::Object(mut m) = doc else { return doc };
    let includes: Vec<&str> = spec.iter().filter(|(_, inc)| *inc).map(|(k, _)| root(k)).collect();
    if includes.is_empty() {
        for (k, _) in &spec {
            remove_path(&mut m, k);
        }
        return Value::Object(m);
    }
    m.retain(|k, _| k == "id" || includes.contains(&k.as_str()));
    Value::Object(m)
}

fn field_toggle(token: &str) -> (String, bool) {
    match token.strip_prefix('-') {
        Some(name) => (name.to_string(), false),
        None => (token.trim_start_matches('+').to_string(), true),
    }
}

fn root(path: &str) -> &str {
    path.split('.').next().unwrap_or(path)
}

/// `"-createdAt,name"` or `"price:desc name:asc"`.
pub fn parse_sort(spec: &str) -> Vec<(String, SortOrder)> {
    spec.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .map(|t| {
            if let Some(f) = t.strip_prefix('-') {
                return (f.to_string(), SortOrder::Desc);
            }
            match t.split_once(':') {
                Some((f, dir)) if dir.eq_ignore_ascii_case("desc") => (f.to_string(), SortOrder::Desc),
                Some((f, _)) => (f.to_string(), SortOrder::Asc),
                None => (t.to_string(), SortOrder::Asc),
            }
        })
        .collect()
}

/// Stable sort; missing values order before present ones.
pub fn sort_docs(docs: &mut [Value], sort: &[(String, SortOrder)]) {
    if sort.is_empty() {
        return;
    }
    docs.sort_by(|a, b| {
        for (field, order) in sort {
            let ord = match (lookup(a, field), lookup(b, field)) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
            };
            let ord = if *order == SortOrder::Desc { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn equality_matches_array_membership() {
        let doc = json!({"tags": ["new", "sale"], "code": "A1"});
        assert!(matches(&doc, &obj(json!({"tags": "sale"})), &[]).unwrap());
        assert!(matches(&doc, &obj(json!({"code": "A1"})), &[]).unwrap());
        assert!(!matches(&doc, &obj(json!({"code": "A2"})), &[]).unwrap());
        assert!(matches(&doc, &obj(json!({"missing": null})), &[]).unwrap());
    }

    #[test]
    fn comparison_and_set_operators() {
        let doc = json!({"price": 10, "status": "draft"});
        assert!(matches(&doc, &obj(json!({"price": {"$gte": 10, "$lt": 11}})), &[]).unwrap());
        assert!(!matches(&doc, &obj(json!({"price": {"$gt": 10}})), &[]).unwrap());
        assert!(matches(&doc, &obj(json!({"status": {"$in": ["draft", "success"]}})), &[]).unwrap());
        assert!(matches(&doc, &obj(json!({"status": {"$nin": ["cancel"]}})), &[]).unwrap());
        assert!(matches(&doc, &obj(json!({"deletedAt": {"$exists": false}})), &[]).unwrap());
    }

    #[test]
    fn logical_operators_and_regex() {
        let doc = json!({"name": "Red Shoe", "price": 5});
        let f = obj(json!({"$or": [{"price": 1}, {"name": {"$regex": "^red", "$options": "i"}}]}));
        assert!(matches(&doc, &f, &[]).unwrap());
        let f = obj(json!({"$nor": [{"price": 5}]}));
        assert!(!matches(&doc, &f, &[]).unwrap());
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let err = matches(&json!({}), &obj(json!({"a": {"$near": 1}})), &[]).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn text_search_words_and_phrases() {
        let doc = json!({"name": "Blue running shoe", "code": "X"});
        let fields = vec!["name".to_string()];
        assert!(text_match(&doc, "red shoe", &fields));
        assert!(!text_match(&doc, "\"red shoe\"", &fields));
        assert!(text_match(&doc, "\"running shoe\"", &fields));
        assert!(!text_match(&doc, "x", &fields));
        assert!(text_match(&doc, "x", &[]));
    }

    #[test]
    fn update_operators() {
        let mut doc = obj(json!({"quantity": 2, "histories": []}));
        apply_update(
            &mut doc,
            &obj(json!({"$inc": {"quantity": 3}, "$push": {"histories": {"status": "success"}}, "$set": {"meta.note": "x"}})),
        )
        .unwrap();
        assert_eq!(doc["quantity"], json!(5));
        assert_eq!(doc["histories"], json!([{"status": "success"}]));
        assert_eq!(doc["meta"], json!({"note": "x"}));

        apply_update(&mut doc, &obj(json!({"title": "plain"}))).unwrap();
        assert_eq!(doc["title"], json!("plain"));

        apply_update(&mut doc, &obj(json!({"$addToSet": {"tags": {"$each": ["a", "a", "b"]}}}))).unwrap();
        assert_eq!(doc["tags"], json!(["a", "b"]));
        apply_update(&mut doc, &obj(json!({"$pull": {"tags": "a"}, "$unset": {"title": ""}}))).unwrap();
        assert_eq!(doc["tags"], json!(["b"]));
        assert!(!doc.contains_key("title"));
    }

    #[test]
    fn projection_and_select() {
        let doc = json!({"id": "1", "name": "a", "code": "b", "price": 3});
        assert_eq!(project(doc.clone(), Some(&json!({"name": 1})), None), json!({"id": "1", "name": "a"}));
        assert_eq!(
            project(doc.clone(), None, Some(&json!("-price -code"))),
            json!({"id": "1", "name": "a"})
        );
        assert_eq!(project(doc.clone(), None, Some(&json!(["code"]))), json!({"id": "1", "code": "b"}));
        assert_eq!(project(doc.clone(), None, None), doc);
    }

    #[test]
    fn sorting() {
        let mut docs = vec![json!({"n": 2, "s": "b"}), json!({"n": 1, "s": "b"}), json!({"n": 3, "s": "a"})];
        sort_docs(&mut docs, &parse_sort("s,-n"));
        let ns: Vec<_> = docs.iter().map(|d| d["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, vec![3, 2, 1]);
        assert_eq!(parse_sort("price:desc"), vec![("price".to_string(), SortOrder::Desc)]);
    }
}
