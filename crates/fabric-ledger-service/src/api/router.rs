use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/receipts", post(handlers::append_receipt))
        .route("/receipts/:id", get(handlers::get_receipt))
        .route("/receipts/:id/archive", post(handlers::archive_receipt))
        .route("/receipts/task/:task_id", get(handlers::task_timeline))
        .route("/receipts/chain/:id", get(handlers::receipt_chain))
        .route("/inbox", get(handlers::inbox))
        .route("/search", get(handlers::search))
        .route("/bootstrap", post(handlers::bootstrap));

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
