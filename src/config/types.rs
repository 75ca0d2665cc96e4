//! Route descriptors: which CRUD methods a prefix exposes and which hand-written routes it adds.

use crate::error::ConfigError;
use crate::repository::RepositoryRef;
use crate::routes::middleware::{Endpoint, Middleware};
use axum::http::Method;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// The generated CRUD operations. Each maps to exactly one verb and sub-path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MethodName {
    List,
    Find,
    FindOne,
    Create,
    BulkCreate,
    Update,
    UpdateOne,
    Delete,
    DeleteOne,
    Schema,
}

impl MethodName {
    pub const ALL: [MethodName; 10] = [
        MethodName::List,
        MethodName::Find,
        MethodName::FindOne,
        MethodName::Create,
        MethodName::BulkCreate,
        MethodName::Update,
        MethodName::UpdateOne,
        MethodName::Delete,
        MethodName::DeleteOne,
        MethodName::Schema,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MethodName::List => "list",
            MethodName::Find => "find",
            MethodName::FindOne => "findOne",
            MethodName::Create => "create",
            MethodName::BulkCreate => "bulkCreate",
            MethodName::Update => "update",
            MethodName::UpdateOne => "updateOne",
            MethodName::Delete => "delete",
            MethodName::DeleteOne => "deleteOne",
            MethodName::Schema => "schema",
        }
    }

    pub fn verb(&self) -> Method {
        match self {
            MethodName::List | MethodName::Find | MethodName::FindOne | MethodName::Schema => Method::GET,
            MethodName::Create | MethodName::BulkCreate => Method::POST,
            MethodName::Update | MethodName::UpdateOne => Method::PUT,
            MethodName::Delete | MethodName::DeleteOne => Method::DELETE,
        }
    }

    pub fn sub_path(&self) -> &'static str {
        match self {
            MethodName::List | MethodName::Create | MethodName::Update | MethodName::Delete => "/",
            MethodName::Find => "/find",
            MethodName::FindOne => "/find-one",
            MethodName::BulkCreate => "/bulk-create",
            MethodName::UpdateOne | MethodName::DeleteOne => "/:id",
            MethodName::Schema => "/schema",
        }
    }

    /// Read routes get their query string normalized before anything else runs.
    pub fn is_read(&self) -> bool {
        matches!(self, MethodName::List | MethodName::Find | MethodName::FindOne)
    }
}

impl fmt::Display for MethodName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MethodName {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MethodName::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownMethod(s.to_string()))
    }
}

/// A hand-declared route: interceptors run in order, then the endpoint.
#[derive(Clone, Default)]
pub struct CustomRoute {
    pub chain: Vec<Middleware>,
    pub endpoint: Option<Endpoint>,
}

impl CustomRoute {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            chain: Vec::new(),
            endpoint: Some(endpoint),
        }
    }

    /// A declaration with no handlers; never mounted.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn before(mut self, mw: Middleware) -> Self {
        self.chain.push(mw);
        self
    }
}

/// Everything mounted under one path prefix. Immutable once handed to the registry.
#[derive(Clone)]
pub struct RouteConfig {
    pub path: String,
    pub repository: Option<RepositoryRef>,
    pub methods: Vec<MethodName>,
    pub middleware: Vec<Middleware>,
    pub method_middleware: HashMap<MethodName, Vec<Middleware>>,
    /// `"VERB /sub-path"` keys in declaration order.
    pub custom_routes: Vec<(String, CustomRoute)>,
}

impl RouteConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            repository: None,
            methods: MethodName::ALL.to_vec(),
            middleware: Vec::new(),
            method_middleware: HashMap::new(),
            custom_routes: Vec::new(),
        }
    }

    pub fn repository(mut self, repo: RepositoryRef) -> Self {
        self.repository = Some(repo);
        self
    }

    /// Replaces the enabled set; duplicates are dropped, order kept.
    pub fn methods(mut self, methods: &[MethodName]) -> Self {
        self.methods.clear();
        for m in methods {
            if !self.methods.contains(m) {
                self.methods.push(*m);
            }
        }
        self
    }

    pub fn disable(mut self, method: MethodName) -> Self {
        self.methods.retain(|m| *m != method);
        self
    }

    /// Runs before every route of this prefix.
    pub fn middleware(mut self, mw: Middleware) -> Self {
        self.middleware.push(mw);
        self
    }

    pub fn method_middleware(mut self, method: MethodName, mw: Middleware) -> Self {
        self.method_middleware.entry(method).or_default().push(mw);
        self
    }

    pub fn custom(mut self, key: impl Into<String>, route: CustomRoute) -> Self {
        self.custom_routes.push((key.into(), route));
        self
    }

    pub fn middleware_for(&self, method: MethodName) -> &[Middleware] {
        self.method_middleware.get(&method).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Enabled CRUD methods; empty when there is no repository.
    pub fn crud_methods(&self) -> &[MethodName] {
        if self.repository.is_some() {
            &self.methods
        } else {
            &[]
        }
    }
}

impl fmt::Debug for RouteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteConfig")
            .field("path", &self.path)
            .field("repository", &self.repository.as_ref().map(|r| r.name().to_string()))
            .field("methods", &self.methods)
            .field("custom_routes", &self.custom_routes.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .finish()
    }
}

const VERBS: [&str; 9] = ["get", "post", "put", "patch", "delete", "connect", "options", "trace", "head"];

/// Splits `"GET /make-done"` into its verb and sub-path.
pub fn parse_route_key(prefix: &str, key: &str) -> Result<(Method, String), ConfigError> {
    let malformed = || ConfigError::MalformedRouteKey {
        prefix: prefix.to_string(),
        key: key.to_string(),
    };
    let trimmed = key.trim();
    let (verb, rest) = trimmed.split_once(char::is_whitespace).ok_or_else(malformed)?;
    let lower = verb.to_ascii_lowercase();
    if !VERBS.contains(&lower.as_str()) {
        return Err(ConfigError::UnknownVerb {
            prefix: prefix.to_string(),
            key: key.to_string(),
            verb: verb.to_string(),
        });
    }
    let path = rest.trim();
    if !path.starts_with('/') {
        return Err(malformed());
    }
    let method = Method::from_bytes(lower.to_ascii_uppercase().as_bytes()).map_err(|_| malformed())?;
    Ok((method, path.to_string()))
}

/// `prefix` + `sub`, without doubled or trailing slashes: `/todo` + `/` = `/todo`.
pub fn join_path(prefix: &str, sub: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    match (prefix.is_empty(), sub) {
        (true, "") => "/".to_string(),
        (true, _) => sub.to_string(),
        (false, "/") | (false, "") => prefix.to_string(),
        (false, _) => format!("{}{}", prefix, sub),
    }
}
