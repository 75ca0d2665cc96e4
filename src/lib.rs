//! Storefront gateway: declarative CRUD routes over document repositories.

pub mod api;
pub mod app;
pub mod auth;
pub mod case;
pub mod config;
pub mod context;
pub mod entities;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod query;
pub mod repository;
pub mod response;
pub mod routes;
pub mod schema;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use app::build_app;
pub use config::{validate_routes, CustomRoute, MethodName, RouteConfig, Settings};
pub use context::{AuthUser, RequestMeta};
pub use entities::Repositories;
pub use error::{AppError, ConfigError, FieldError};
pub use query::{query_normalizer, NormalizedQuery, QueryContext};
pub use repository::{Catalog, DeleteResult, Page, Repository, RepositoryRef, ValidationMode, WriteRequest};
pub use routes::{Endpoint, Middleware, RouteDescriptor, RouteRegistry};
pub use schema::{EntitySchema, FieldDef, PopulateDef};
pub use service::{DocumentRepository, Hook, HookContext, HookPipeline};
pub use state::AppState;
pub use store::{ensure_database_exists, DocumentStore, MemoryStore, PgStore, StoreRef};
