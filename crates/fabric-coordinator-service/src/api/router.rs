use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/tasks", post(handlers::create_task))
        .route("/tasks", get(handlers::list_tasks))
        .route("/tasks/:id", get(handlers::get_task))
        .route("/lease", post(handlers::lease))
        .route("/lease/:id/heartbeat", post(handlers::heartbeat))
        .route("/lease/:id/complete", post(handlers::complete))
        .route("/lease/:id/fail", post(handlers::fail))
        .route("/admin/expire-leases", get(handlers::expire_leases));

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
