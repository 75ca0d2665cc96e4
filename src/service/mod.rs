//! Repository implementation: validation, hooks, population and CRUD over a store.

mod crud;
pub mod hooks;
pub mod populate;
mod validation;

pub use crud::DocumentRepository;
pub use hooks::{Hook, HookContext, HookPipeline};
pub use populate::PopulateSpec;
pub use validation::EntityValidator;
