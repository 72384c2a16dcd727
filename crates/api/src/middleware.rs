use axum::{http::HeaderMap, middleware::Next, response::Response};

use crate::context::RequestContext;

pub const RESPONSIBLE_PARTY_HEADER: &str = "x-responsible-party";

/// Attach a [`RequestContext`] to every request.
pub async fn request_context_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let ctx = RequestContext::new(responsible_party(req.headers()));
    req.extensions_mut().insert(ctx);
    next.run(req).await
}

fn responsible_party(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(RESPONSIBLE_PARTY_HEADER)?.to_str().ok()?.trim();
    if value.is_empty() {
        return None;
    }
    Some(value.to_string())
}
