//! Identity: tokens, password hashing and the guard middleware.

pub mod guard;
pub mod password;
pub mod token;

pub use guard::{authentication_guard, authorization_guard, fetch_user};
pub use password::{hash_password, verify_password};
pub use token::{bearer_token, TokenService};

use crate::context::AuthUser;
use crate::error::AppError;
use crate::query::QueryContext;
use crate::repository::RepositoryRef;
use serde_json::{json, Value};

/// Resolves bearer tokens to users through the user repository.
#[derive(Clone)]
pub struct AuthService {
    tokens: TokenService,
    users: RepositoryRef,
}

impl AuthService {
    pub fn new(tokens: TokenService, users: RepositoryRef) -> Self {
        Self { tokens, users }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn users(&self) -> &RepositoryRef {
        &self.users
    }

    /// User by id with roles populated; `None` when no such user.
    pub async fn fetch_user(&self, id: &str) -> Result<Option<AuthUser>, AppError> {
        let ctx = QueryContext::by_id(id).with_populates(vec![json!("roles")]);
        let doc = self.users.find_one(ctx).await?;
        Ok(doc.as_ref().map(auth_user))
    }

    /// `Authorization` header value to the acting user. Every failure is a 401
    /// except store or key errors.
    pub async fn authenticate(&self, header: Option<&str>) -> Result<AuthUser, AppError> {
        let token = header
            .and_then(bearer_token)
            .ok_or_else(|| AppError::unauthorized("Token not found"))?;
        let claims = self.tokens.verify(token)?;
        self.fetch_user(&claims.sub)
            .await?
            .ok_or_else(|| AppError::unauthorized("User not found"))
    }
}

/// Builds the request identity from a user document with populated roles.
pub fn auth_user(doc: &Value) -> AuthUser {
    let roles = doc
        .get("roles")
        .and_then(Value::as_array)
        .map(|roles| {
            roles
                .iter()
                .filter_map(|r| r.get("code").and_then(Value::as_str).map(String::from))
                .collect()
        })
        .unwrap_or_default();
    AuthUser {
        id: doc.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
        username: doc.get("username").and_then(Value::as_str).unwrap_or_default().to_string(),
        is_admin: doc.get("isAdmin").and_then(Value::as_bool).unwrap_or(false),
        roles,
        profile: doc.get("profile").cloned().unwrap_or(Value::Null),
    }
}
