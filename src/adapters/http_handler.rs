//! HTTP surface of the gateway.
//!
//! Builds the axum router: three fixed endpoints (`/`, `/health`,
//! `/metrics`) plus a fallback that forwards everything else according to
//! the reverse-proxy configuration. The fixed pipeline (request id, request
//! logging, HTTP metrics) wraps all of them.
use std::{net::SocketAddr, sync::Arc};

use arc_swap::ArcSwap;
use axum::{
    Json, Router,
    extract::{ConnectInfo, Request, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::Instrument;

use crate::{
    adapters::middleware::{self, GatewayRequestId},
    config::SERVICE_NAME,
    core::GatewayService,
    metrics::{UpstreamTimer, increment_upstream_request},
    ports::http_client::HttpClient,
    tracing_setup,
};

/// Shared state handed to every handler. Cheap to clone; the gateway
/// snapshot is swapped atomically on configuration reload.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<ArcSwap<GatewayService>>,
    pub http_client: Arc<dyn HttpClient>,
    pub prometheus: PrometheusHandle,
}

/// Assemble the gateway router with the fixed middleware pipeline.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(service_banner))
        .route("/health", get(health))
        .route("/metrics", get(metrics_exposition))
        .fallback(proxy)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(GatewayRequestId))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(axum::middleware::from_fn(middleware::request_logging))
                .layer(axum::middleware::from_fn(middleware::http_metrics)),
        )
        .with_state(state)
}

/// `GET /` — service banner identifying the gateway and where routing and
/// metrics live.
async fn service_banner(State(state): State<AppState>) -> Json<serde_json::Value> {
    let gateway = state.gateway.load_full();
    Json(json!({
        "service": SERVICE_NAME,
        "routes": gateway.route_count(),
        "metrics": "/metrics",
    }))
}

/// `GET /health` — aggregate health of the tracked destinations. A gateway
/// with nothing to track (no destinations, or probing disabled) is healthy.
async fn health(State(state): State<AppState>) -> Response {
    let gateway = state.gateway.load_full();
    let total = gateway.destination_count();
    let healthy = gateway.healthy_destination_count();
    let probing = gateway.health_config().enabled;

    let status = if !probing || total == 0 || healthy > 0 {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = json!({
        "status": if status == StatusCode::OK { "healthy" } else { "unhealthy" },
        "destinations": {
            "healthy": healthy,
            "total": total,
        },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status, Json(body)).into_response()
}

/// `GET /metrics` — Prometheus text exposition.
async fn metrics_exposition(State(state): State<AppState>) -> Response {
    (
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
        .into_response()
}

/// Fallback — forward the request per the reverse-proxy configuration.
async fn proxy(State(state): State<AppState>, mut req: Request) -> Response {
    let client_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);

    let gateway = state.gateway.load_full();
    let path = req.uri().path().to_string();
    let method = req.method().to_string();

    let Some((route_id, route)) = gateway.find_route(&path) else {
        tracing::debug!("No route matched path {}", path);
        return error_response(StatusCode::NOT_FOUND, "no route matched the request path");
    };
    let cluster_id = route.cluster.clone();

    let Some(candidate) = gateway.select_destination(&cluster_id) else {
        tracing::warn!(
            "No healthy destination in cluster '{}' for route '{}'",
            cluster_id,
            route_id
        );
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "no healthy destination available",
        );
    };

    let path_and_query = GatewayService::upstream_path_and_query(route, &path, req.uri().query());
    let upstream_uri = format!("{}{}", candidate.address, path_and_query);
    match upstream_uri.parse() {
        Ok(uri) => *req.uri_mut() = uri,
        Err(e) => {
            tracing::error!("Failed to build upstream URI '{}': {}", upstream_uri, e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "invalid upstream URI");
        }
    }

    append_forwarded_headers(&mut req, client_addr);

    let span = tracing_setup::upstream_span(&cluster_id, &candidate.address, &method, &path);
    let timer = UpstreamTimer::new(&cluster_id, &candidate.address);

    match state.http_client.forward(req).instrument(span).await {
        Ok(response) => {
            drop(timer);
            increment_upstream_request(&cluster_id, &candidate.address, response.status().as_u16());
            response
        }
        Err(e) => {
            drop(timer);
            increment_upstream_request(
                &cluster_id,
                &candidate.address,
                StatusCode::BAD_GATEWAY.as_u16(),
            );
            tracing::error!(
                "Upstream request to '{}' failed: {}",
                candidate.address,
                e
            );
            error_response(StatusCode::BAD_GATEWAY, "upstream request failed")
        }
    }
}

fn append_forwarded_headers(req: &mut Request, client_addr: Option<SocketAddr>) {
    let original_host = req.headers().get(header::HOST).cloned();
    let headers = req.headers_mut();

    if let Some(addr) = client_addr {
        let client_ip = addr.ip().to_string();
        let forwarded_for = match headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
        {
            Some(existing) => format!("{existing}, {client_ip}"),
            None => client_ip,
        };
        if let Ok(value) = header::HeaderValue::from_str(&forwarded_for) {
            headers.insert("x-forwarded-for", value);
        }
    }

    headers.insert(
        "x-forwarded-proto",
        header::HeaderValue::from_static("http"),
    );
    if let Some(host) = original_host {
        headers.insert("x-forwarded-host", host);
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
