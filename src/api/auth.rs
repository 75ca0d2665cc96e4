use crate::auth::authentication_guard;
use crate::config::{CustomRoute, RouteConfig};
use crate::handlers::auth as h;
use crate::routes::{Endpoint, RouteDescriptor};
use crate::state::AppState;

pub fn routes(state: &AppState) -> RouteDescriptor {
    RouteConfig::new("/auth")
        .custom(
            "GET /me",
            CustomRoute::new(Endpoint::new(h::me)).before(authentication_guard(state.auth.clone())),
        )
        .custom("POST /login", CustomRoute::new(Endpoint::with_state(h::login, state.clone())))
        .custom(
            "POST /register",
            CustomRoute::new(Endpoint::with_state(h::register, state.clone())),
        )
        .custom("POST /init", CustomRoute::new(Endpoint::with_state(h::init, state.clone())))
        .into()
}
