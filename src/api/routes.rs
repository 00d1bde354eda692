use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::api::handlers;
use crate::logic::RemoteJoiner;

pub fn create_router() -> Router<Arc<RemoteJoiner>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Topology introspection
        .route("/services", get(handlers::list_services))
        // Joined queries
        .route("/query", post(handlers::run_query))
}
