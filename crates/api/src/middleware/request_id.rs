use axum::{body::Body, http::Request, middleware::Next, response::Response};
use nanoid::nanoid;
use tracing::Instrument;

use crate::state::RequestId;

pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let request_id = format!("req_{}", nanoid!(16));
    req.extensions_mut().insert(RequestId(request_id.clone()));

    let span = tracing::info_span!("request", request_id = %request_id, path = %req.uri().path());
    let mut resp = next.run(req).instrument(span).await;
    if let Ok(value) = request_id.parse() {
        resp.headers_mut().insert("X-Request-Id", value);
    }
    resp
}
