//! HTTP handlers: generated CRUD operations and the account endpoints.

pub mod auth;
pub mod crud;
