//! Route binding: generated CRUD routes, custom routes and the registry that mounts them.

mod common;
pub mod crud;
pub mod custom;
pub mod middleware;
pub mod registry;
pub mod table;

pub use common::common_routes;
pub use crud::{bind_crud, CrudTarget};
pub use custom::bind_custom;
pub use middleware::{apply_chain, Endpoint, Middleware};
pub use registry::{RouteDescriptor, RouteRegistry};
pub use table::RouteTable;
