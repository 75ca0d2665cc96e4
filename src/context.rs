//! Per-request context handed to repositories and hooks.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Authenticated principal resolved from a bearer token.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub is_admin: bool,
    /// Role codes held by the user.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Full user document with sensitive fields removed.
    #[serde(default)]
    pub profile: Value,
}

impl AuthUser {
    pub fn has_role(&self, code: &str) -> bool {
        self.roles.iter().any(|r| r == code)
    }
}

/// Immutable request metadata. Middleware builds a new value and replaces the
/// request extension; handlers and hooks only read it.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RequestMeta {
    user: Option<AuthUser>,
    authenticated: bool,
}

impl RequestMeta {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(user: AuthUser) -> Self {
        Self {
            user: Some(user),
            authenticated: true,
        }
    }

    pub fn user(&self) -> Option<&AuthUser> {
        self.user.as_ref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }
}
