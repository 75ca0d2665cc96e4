//! Shared application state: settings, the document store, repositories and auth.

use crate::auth::{AuthService, TokenService};
use crate::config::Settings;
use crate::entities::Repositories;
use crate::error::AppError;
use crate::store::{MemoryStore, StoreRef};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: StoreRef,
    pub repos: Repositories,
    pub auth: AuthService,
}

impl AppState {
    pub fn new(settings: Settings, store: StoreRef) -> Result<Self, AppError> {
        let repos = Repositories::build(store.clone())?;
        let tokens = TokenService::new(&settings.jwt_secret, settings.token_ttl_days);
        let auth = AuthService::new(tokens, repos.user.clone());
        Ok(Self {
            settings: Arc::new(settings),
            store,
            repos,
            auth,
        })
    }

    /// State over a fresh in-memory store.
    pub fn in_memory(settings: Settings) -> Result<Self, AppError> {
        Self::new(settings, Arc::new(MemoryStore::new()))
    }
}
