use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use avicola_core::{FarmId, MovementId};
use avicola_infra::LedgerError;

use crate::app::errors::ApiJson;
use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::RequestContext;

/// Routes nested under `/farms/:farm_id/inventory`.
pub fn farm_router() -> Router {
    Router::new()
        .route("/entries", post(post_entry))
        .route("/exits", post(post_exit))
        .route("/adjustments", post(post_adjust))
        .route("/transfers", post(post_transfer))
        .route("/stock-counts", post(apply_stock_count))
        .route("/balances", get(list_balances))
        .route("/balances/:item_id", get(get_balance))
        .route("/movements", get(list_movements))
        .route("/items/:item_id/kardex", get(get_kardex))
        .route("/items/:item_id/audit", get(get_audit))
}

pub async fn post_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(farm_id): Path<i64>,
    ApiJson(body): ApiJson<dto::PostQuantityRequest>,
) -> axum::response::Response {
    let cmd = body.into_entry(FarmId::new(farm_id), &ctx);
    match services.post_entry(cmd).await {
        Ok(movement) => (StatusCode::CREATED, Json(movement)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn post_exit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(farm_id): Path<i64>,
    ApiJson(body): ApiJson<dto::PostQuantityRequest>,
) -> axum::response::Response {
    let cmd = body.into_exit(FarmId::new(farm_id), &ctx);
    match services.post_exit(cmd).await {
        Ok(movement) => (StatusCode::CREATED, Json(movement)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn post_adjust(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(farm_id): Path<i64>,
    ApiJson(body): ApiJson<dto::PostAdjustRequest>,
) -> axum::response::Response {
    let cmd = body.into_command(FarmId::new(farm_id), &ctx);
    match services.post_adjust(cmd).await {
        Ok(movement) => (StatusCode::CREATED, Json(movement)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn post_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(farm_id): Path<i64>,
    ApiJson(body): ApiJson<dto::PostTransferRequest>,
) -> axum::response::Response {
    let cmd = body.into_command(FarmId::new(farm_id), &ctx);
    match services.post_transfer(cmd).await {
        Ok(receipt) => (StatusCode::CREATED, Json(receipt)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn apply_stock_count(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(farm_id): Path<i64>,
    ApiJson(body): ApiJson<dto::StockCountRequest>,
) -> axum::response::Response {
    let count = body.into_command(FarmId::new(farm_id), &ctx);
    match services.apply_stock_count(count).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn list_balances(
    Extension(services): Extension<Arc<AppServices>>,
    Path(farm_id): Path<i64>,
) -> axum::response::Response {
    match services.list_balances(FarmId::new(farm_id)).await {
        Ok(balances) => (StatusCode::OK, Json(balances)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn get_balance(
    Extension(services): Extension<Arc<AppServices>>,
    Path((farm_id, item_id)): Path<(i64, String)>,
) -> axum::response::Response {
    let item = match errors::parse_item_ref(&item_id) {
        Ok(item) => item,
        Err(resp) => return resp,
    };
    match services.get_balance(FarmId::new(farm_id), &item).await {
        Ok(balance) => (StatusCode::OK, Json(balance)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn list_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Path(farm_id): Path<i64>,
    Query(query): Query<dto::MovementListQuery>,
) -> axum::response::Response {
    let (filter, pagination) = match query.into_filter() {
        Ok(v) => v,
        Err(e) => return errors::ledger_error_to_response(LedgerError::from(e)),
    };
    match services
        .list_movements(FarmId::new(farm_id), filter, pagination)
        .await
    {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn get_movement(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<i64>,
) -> axum::response::Response {
    match services.get_movement(MovementId::new(id)).await {
        Ok(movement) => (StatusCode::OK, Json(movement)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn get_kardex(
    Extension(services): Extension<Arc<AppServices>>,
    Path((farm_id, item_id)): Path<(i64, String)>,
    Query(query): Query<dto::KardexQuery>,
) -> axum::response::Response {
    let item = match errors::parse_item_ref(&item_id) {
        Ok(item) => item,
        Err(resp) => return resp,
    };
    match services
        .kardex(FarmId::new(farm_id), &item, query.from, query.to)
        .await
    {
        Ok(kardex) => (StatusCode::OK, Json(kardex)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn get_audit(
    Extension(services): Extension<Arc<AppServices>>,
    Path((farm_id, item_id)): Path<(i64, String)>,
) -> axum::response::Response {
    let item = match errors::parse_item_ref(&item_id) {
        Ok(item) => item,
        Err(resp) => return resp,
    };
    match services.audit(FarmId::new(farm_id), &item).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}
