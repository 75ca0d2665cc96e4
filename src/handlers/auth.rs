//! Account endpoints: current user, login, registration and first-run setup.

use crate::auth::{hash_password, verify_password};
use crate::context::{AuthUser, RequestMeta};
use crate::entities::account::{ROLE_ADMIN, ROLE_CUSTOMER, ROLE_STAFF};
use crate::error::{AppError, FieldError};
use crate::extractors::JsonBody;
use crate::query::QueryContext;
use crate::repository::WriteRequest;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};

pub const INITED_APP_KEY: &str = "inited_app";

pub async fn me(meta: RequestMeta) -> Result<Json<AuthUser>, AppError> {
    meta.user()
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::unauthorized("Token not found"))
}

fn field<'a>(body: &'a Value, name: &str) -> Option<&'a str> {
    body.get(name).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn by(key: &str, value: Value) -> QueryContext {
    let mut query = Map::new();
    query.insert(key.into(), value);
    QueryContext::new(query)
}

fn doc_id(doc: &Value) -> Result<&str, AppError> {
    doc.get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::internal("stored document has no id"))
}

/// `username` and `password` are required; reports every missing one.
fn credentials(body: &Value, prefix: &str) -> Result<(String, String), AppError> {
    let mut errors = Vec::new();
    let username = field(body, "username");
    let password = field(body, "password");
    if username.is_none() {
        errors.push(FieldError::new(format!("{}username", prefix), "username is required"));
    }
    if password.is_none() {
        errors.push(FieldError::new(format!("{}password", prefix), "password is required"));
    }
    match (username, password) {
        (Some(u), Some(p)) => Ok((u.to_string(), p.to_string())),
        _ => Err(AppError::validation(errors)),
    }
}

fn profile(body: &Value) -> Value {
    let p = body.get("profile").cloned().unwrap_or(Value::Null);
    json!({
        "name": p.get("name").cloned().unwrap_or(Value::Null),
        "avatar": p.get("avatar").cloned().unwrap_or(Value::Null),
        "gender": p.get("gender").and_then(Value::as_str).unwrap_or("male"),
    })
}

pub async fn login(State(state): State<AppState>, JsonBody(body): JsonBody) -> Result<Json<Value>, AppError> {
    let Some(username) = field(&body, "username") else {
        return Err(AppError::unauthorized("User not found"));
    };
    let password = field(&body, "password").unwrap_or_default();
    let user = state
        .repos
        .user
        .find_one(by("username", json!(username)))
        .await?
        .ok_or_else(|| AppError::unauthorized("User not found"))?;
    if user.get("blocked").and_then(Value::as_bool).unwrap_or(false) {
        return Err(AppError::unauthorized("User is blocked"));
    }
    let hash = user.get("password").and_then(Value::as_str).unwrap_or_default();
    if hash.is_empty() || !verify_password(password, hash)? {
        return Err(AppError::unauthorized("Password not match"));
    }
    let token = state.auth.tokens().issue(doc_id(&user)?)?;
    tracing::info!(username = %username, "user logged in");
    Ok(Json(json!({ "token": token })))
}

#[derive(Debug, Default, Deserialize)]
pub struct RegisterParams {
    pub method: Option<String>,
}

pub async fn register(
    State(state): State<AppState>,
    Query(params): Query<RegisterParams>,
    JsonBody(body): JsonBody,
) -> Result<Json<Value>, AppError> {
    let method = params.method.as_deref().unwrap_or("username");
    if method != "username" {
        return Err(AppError::bad_request(format!("Register method {} is not supported", method)));
    }
    let (username, password) = credentials(&body, "")?;
    let users = &state.repos.user;
    if users.find_one(by("username", json!(username))).await?.is_some() {
        return Err(AppError::bad_request("User already exists"));
    }
    let customer = state
        .repos
        .role
        .find_one(by("code", json!(ROLE_CUSTOMER)))
        .await?
        .ok_or_else(|| AppError::status(StatusCode::SERVICE_UNAVAILABLE, "application is not initialized"))?;
    let data = json!({
        "username": username,
        "password": hash_password(&password)?,
        "blocked": false,
        "roles": [doc_id(&customer)?],
        "profile": profile(&body),
    });
    let mut user = users
        .create(WriteRequest::new(data).with_populates(vec![json!("roles")]))
        .await?;
    let token = state.auth.tokens().issue(doc_id(&user)?)?;
    users.schema().redact(&mut user);
    tracing::info!(username = %username, "user registered");
    Ok(Json(json!({ "token": token, "user": user })))
}

fn truthy(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map_or(false, |f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

/// First-run setup: the three roles, the admin user and the `inited_app` flag.
/// Refuses to run twice.
pub async fn init(State(state): State<AppState>, JsonBody(body): JsonBody) -> Result<Json<Value>, AppError> {
    let repos = &state.repos;
    let flag = repos.config.find_one(by("key", json!(INITED_APP_KEY))).await?;
    if truthy(flag.as_ref().and_then(|f| f.get("value"))) {
        return Err(AppError::conflict("App already initialized"));
    }
    let admin = body.get("admin").cloned().unwrap_or(Value::Null);
    let (username, password) = credentials(&admin, "admin.")?;

    let roles = repos
        .role
        .create_many(WriteRequest::new(json!([
            { "name": "Admin", "code": ROLE_ADMIN },
            { "name": "Staff", "code": ROLE_STAFF },
            { "name": "Customer", "code": ROLE_CUSTOMER },
        ])))
        .await?;
    let admin_role = roles
        .iter()
        .find(|r| r.get("code").and_then(Value::as_str) == Some(ROLE_ADMIN))
        .map(doc_id)
        .transpose()?;

    let data = json!({
        "username": username,
        "password": hash_password(&password)?,
        "blocked": false,
        "isAdmin": true,
        "roles": admin_role.into_iter().collect::<Vec<_>>(),
        "profile": profile(&admin),
    });
    let mut admin_user = repos
        .user
        .create(WriteRequest::new(data).with_populates(vec![json!("roles")]))
        .await?;
    let token = state.auth.tokens().issue(doc_id(&admin_user)?)?;

    match flag {
        Some(existing) => {
            let mut query = Map::new();
            query.insert("id".into(), json!(doc_id(&existing)?));
            repos
                .config
                .update_one(WriteRequest::new(json!({ "value": true })).with_query(query))
                .await?;
        }
        None => {
            repos
                .config
                .create(WriteRequest::new(json!({ "key": INITED_APP_KEY, "value": true })))
                .await?;
        }
    }
    repos.user.schema().redact(&mut admin_user);
    tracing::info!(admin = %username, "application initialized");
    Ok(Json(json!({
        "message": "Inited App success",
        "token": token,
        "adminUser": admin_user,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_report_every_missing_field() {
        let err = credentials(&json!({}), "").unwrap_err();
        match err {
            AppError::Validation { errors, .. } => {
                let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, vec!["username", "password"]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            credentials(&json!({"username": "a", "password": "b"}), "").unwrap(),
            ("a".to_string(), "b".to_string())
        );
    }

    #[test]
    fn nested_credentials_are_prefixed() {
        match credentials(&json!({"username": "root"}), "admin.").unwrap_err() {
            AppError::Validation { errors, .. } => assert_eq!(errors[0].field, "admin.password"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn profile_defaults_gender() {
        let p = profile(&json!({"profile": {"name": "Ann"}}));
        assert_eq!(p["name"], "Ann");
        assert_eq!(p["gender"], "male");
        assert!(truthy(Some(&json!(true))));
        assert!(!truthy(Some(&json!(false))));
        assert!(!truthy(None));
    }
}
