use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use avicola_infra::LedgerError;

pub fn ledger_error_to_response(err: LedgerError) -> axum::response::Response {
    let message = err.to_string();
    match err {
        LedgerError::Validation(_) => json_error(StatusCode::BAD_REQUEST, "validation_error", message),
        LedgerError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", message),
        LedgerError::InsufficientStock { .. } => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "insufficient_stock", message)
        }
        LedgerError::NegativeBalance { .. } => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "negative_balance", message)
        }
        LedgerError::ConcurrencyConflict(_) => json_error(StatusCode::CONFLICT, "conflict", message),
        LedgerError::Persistence(_) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "persistence_error", message)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// JSON body extractor whose rejections use the `{error, message}` envelope.
///
/// Unreadable or mistyped bodies are a 400 `validation_error`, so they never
/// share a status with business failures.
pub struct ApiJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    axum::Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = axum::response::Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(json_rejection_to_response(rejection)),
        }
    }
}

pub fn json_rejection_to_response(rejection: JsonRejection) -> axum::response::Response {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => json_error(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "unsupported_media_type",
            rejection.body_text(),
        ),
        other => json_error(StatusCode::BAD_REQUEST, "validation_error", other.body_text()),
    }
}

/// Parse a `:item_id` path segment: digits name an id, anything else a code.
pub fn parse_item_ref(raw: &str) -> ItemRefResult {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "item reference must not be empty",
        ));
    }
    Ok(match raw.parse::<i64>() {
        Ok(id) => avicola_infra::ItemRef::Id(id),
        Err(_) => avicola_infra::ItemRef::Code(raw.to_string()),
    })
}

type ItemRefResult = Result<avicola_infra::ItemRef, axum::response::Response>;

#[cfg(test)]
mod tests {
    use super::*;
    use avicola_infra::ItemRef;

    #[test]
    fn ledger_errors_map_to_documented_statuses() {
        let cases = [
            (LedgerError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (LedgerError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                LedgerError::InsufficientStock {
                    available: 1.into(),
                    requested: 2.into(),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                LedgerError::NegativeBalance {
                    current: 1.into(),
                    delta: (-2).into(),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (LedgerError::ConcurrencyConflict("race".into()), StatusCode::CONFLICT),
            (LedgerError::Persistence("down".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ledger_error_to_response(err).status(), status);
        }
    }

    #[test]
    fn item_path_segment_is_id_or_code() {
        assert_eq!(parse_item_ref("10").ok(), Some(ItemRef::Id(10)));
        assert_eq!(
            parse_item_ref("FEED-STARTER").ok(),
            Some(ItemRef::Code("FEED-STARTER".into()))
        );
        assert!(parse_item_ref(" ").is_err());
    }
}
