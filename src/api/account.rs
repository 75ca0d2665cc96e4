use crate::auth::{authentication_guard, authorization_guard, fetch_user};
use crate::config::RouteConfig;
use crate::entities::account::ROLE_ADMIN;
use crate::routes::RouteDescriptor;
use crate::state::AppState;

/// Users and roles are managed by admins only.
pub fn routes(state: &AppState) -> RouteDescriptor {
    let repos = &state.repos;
    let admin_only = |cfg: RouteConfig| {
        cfg.middleware(authentication_guard(state.auth.clone()))
            .middleware(authorization_guard(&[ROLE_ADMIN]))
    };
    vec![
        RouteConfig::new("/location").repository(repos.location.clone()),
        RouteConfig::new("/address")
            .repository(repos.address.clone())
            .middleware(fetch_user(state.auth.clone())),
        admin_only(RouteConfig::new("/user").repository(repos.user.clone())),
        admin_only(RouteConfig::new("/role").repository(repos.role.clone())),
        RouteConfig::new("/media")
            .repository(repos.media.clone())
            .middleware(fetch_user(state.auth.clone())),
    ]
    .into()
}
