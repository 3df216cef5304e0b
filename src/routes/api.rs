use crate::handlers::{ctrl, direct, health, ws};
use crate::routes::auth_middleware::basic_auth;
use crate::state::SharedState;
use axum::middleware;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

pub fn build_router(state: SharedState) -> Router {
    let ctrl_routes = Router::new()
        .route("/ctrl_rooms", get(ctrl::rooms_ctrl))
        .route("/ctrl_command", get(ctrl::ctrl_command))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            basic_auth,
        ));

    Router::new()
        .route("/ws_entry", get(ws::ws_entry))
        .route("/direct_retrieval", get(direct::directly_retrieve))
        .route("/direct_sending", get(direct::directly_send))
        .route("/hw", get(health::hw_status))
        .merge(ctrl_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
