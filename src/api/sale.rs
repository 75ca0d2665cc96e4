use crate::auth::{authentication_guard, authorization_guard, fetch_user};
use crate::config::{MethodName, RouteConfig};
use crate::entities::account::{ROLE_ADMIN, ROLE_STAFF};
use crate::repository::RepositoryRef;
use crate::routes::RouteDescriptor;
use crate::state::AppState;

const WRITES: [MethodName; 6] = [
    MethodName::Create,
    MethodName::BulkCreate,
    MethodName::Update,
    MethodName::UpdateOne,
    MethodName::Delete,
    MethodName::DeleteOne,
];

pub fn routes(state: &AppState) -> RouteDescriptor {
    let repos = &state.repos;
    let tracked = |path: &str, repo: RepositoryRef| {
        RouteConfig::new(path)
            .repository(repo)
            .middleware(fetch_user(state.auth.clone()))
    };
    // Reads are open; writes need admin or staff.
    let invoice = WRITES.iter().fold(
        RouteConfig::new("/invoice").repository(repos.invoice.clone()),
        |cfg, m| {
            cfg.method_middleware(*m, authentication_guard(state.auth.clone()))
                .method_middleware(*m, authorization_guard(&[ROLE_ADMIN, ROLE_STAFF]))
        },
    );
    vec![
        tracked("/product-attribute", repos.product_attribute.clone()),
        tracked("/product-category", repos.product_category.clone()),
        tracked("/warehouse", repos.warehouse.clone()),
        tracked("/product", repos.product.clone()),
        tracked("/inventory", repos.inventory.clone()),
        invoice,
    ]
    .into()
}
