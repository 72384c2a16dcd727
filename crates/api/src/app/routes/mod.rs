use axum::{routing::get, Router};

pub mod inventory;
pub mod system;

/// Router for all ledger endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/system/info", get(system::info))
        .nest("/farms/:farm_id/inventory", inventory::farm_router())
        .route("/inventory/movements/:id", get(inventory::get_movement))
}
