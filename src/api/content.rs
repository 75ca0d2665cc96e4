use crate::config::{CustomRoute, RouteConfig};
use crate::routes::{Endpoint, RouteDescriptor};
use crate::state::AppState;

async fn make_done() -> &'static str {
    "done"
}

pub fn routes(state: &AppState) -> RouteDescriptor {
    vec![
        RouteConfig::new("/todo")
            .repository(state.repos.todo.clone())
            .custom("GET /make-done", CustomRoute::new(Endpoint::new(make_done))),
        RouteConfig::new("/comment").repository(state.repos.comment.clone()),
    ]
    .into()
}
