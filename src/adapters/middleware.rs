//! Request-pipeline middleware for the gateway.
//!
//! The pipeline is fixed and registered in this order: request-id
//! assignment, request logging, HTTP metrics. Each stage is a lightweight
//! composable layer attached to the axum `Router`; all of them apply to the
//! fixed endpoints as well as to proxied traffic.
use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};
use tower_http::request_id::{MakeRequestId, RequestId};
use tracing::Instrument;
use uuid::Uuid;

use crate::{metrics, tracing_setup};

/// Header carrying the per-request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request-id generator assigning a fresh UUID v4 to each request that does
/// not already carry one.
#[derive(Clone, Copy, Default)]
pub struct GatewayRequestId;

impl MakeRequestId for GatewayRequestId {
    fn make_request_id<B>(&mut self, _request: &http::Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string();
        http::HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Log one completion line per request, carrying method, path, status and
/// latency inside a request-scoped span.
pub async fn request_logging(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let span = tracing_setup::request_span(method.as_str(), &path, &request_id);
    let response = next.run(req).instrument(span.clone()).await;
    let duration = start.elapsed();

    span.record("http.status_code", response.status().as_u16());
    span.record("duration_ms", duration.as_millis() as u64);
    tracing::info!(
        parent: &span,
        "HTTP {} {} responded {} in {:?}",
        method,
        path,
        response.status().as_u16(),
        duration
    );

    response
}

/// Record request counter, duration histogram and in-flight gauge for every
/// request passing through the gateway.
pub async fn http_metrics(req: Request, next: Next) -> Response {
    let method = req.method().to_string();

    metrics::adjust_requests_in_flight(1.0);
    let timer = metrics::RequestTimer::new(&method);

    let response = next.run(req).await;

    drop(timer);
    metrics::adjust_requests_in_flight(-1.0);
    metrics::increment_http_request(&method, response.status().as_u16());

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_is_a_uuid() {
        let mut maker = GatewayRequestId;
        let request = http::Request::builder().body(()).unwrap();

        let id = maker.make_request_id(&request).unwrap();
        let value = id.header_value().to_str().unwrap().to_string();
        assert!(Uuid::parse_str(&value).is_ok());
    }

    #[test]
    fn test_request_ids_are_unique() {
        let mut maker = GatewayRequestId;
        let request = http::Request::builder().body(()).unwrap();

        let first = maker.make_request_id(&request).unwrap();
        let second = maker.make_request_id(&request).unwrap();
        assert_ne!(first.header_value(), second.header_value());
    }
}
