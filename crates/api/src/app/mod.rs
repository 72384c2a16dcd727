//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: ledger, reconciler and kardex wiring per backend
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request DTOs and their mapping onto ledger commands
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(services: Arc<services::AppServices>) -> Router {
    let ledger_routes = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn(middleware::request_context_middleware));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(ledger_routes)
}
