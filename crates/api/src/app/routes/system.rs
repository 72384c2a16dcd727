use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::app::services::AppServices;
use crate::context::RequestContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn info(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "backend": services.backend(),
        "responsible_party": ctx.responsible_party(),
    }))
}
