use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use http_body_util::BodyExt;
use hyper::{Request, Response, Version, header, header::HeaderValue};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use opentelemetry::global;
use rustls_native_certs::load_native_certs;
use tokio::time::timeout;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::ports::http_client::{HttpClient, HttpClientError, HttpClientResult};

const USER_AGENT: &str = concat!("fcg-gateway/", env!("CARGO_PKG_VERSION"));

/// Upstream HTTP client using Hyper with Rustls (HTTP/1.1 + HTTP/2).
///
/// Responsibilities:
/// * Fixes up the Host header for the selected destination
/// * Forces request version to HTTP/1.1 while allowing ALPN to negotiate h2
/// * Injects W3C trace context headers from the active span
/// * Performs HEAD based health probes with timeout
pub struct HttpClientAdapter {
    client: Client<HttpsConnector<HttpConnector>, AxumBody>,
}

impl HttpClientAdapter {
    /// Create a new upstream client.
    pub fn new() -> eyre::Result<Self> {
        // Install default crypto provider for rustls if not already set
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false); // Allow HTTPS URLs

        let mut root_cert_store = rustls::RootCertStore::empty();
        let native_certs = load_native_certs();

        for cert in native_certs.certs {
            if root_cert_store.add(cert).is_err() {
                tracing::warn!("Failed to add native certificate to rustls RootCertStore");
            }
        }
        if !native_certs.errors.is_empty() {
            tracing::warn!(
                "Some native certificates failed to load: {:?}",
                native_certs.errors
            );
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_cert_store)
            .with_no_client_auth();

        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let client = Client::builder(TokioExecutor::new()).build::<_, AxumBody>(https_connector);

        tracing::debug!("Created upstream HTTP client (HTTP/1.1, ALPN h2)");
        Ok(Self { client })
    }

    fn set_destination_headers(req: &mut Request<AxumBody>) -> HttpClientResult<()> {
        let host_header_val = match (req.uri().host(), req.uri().port()) {
            (Some(host), Some(port)) => HeaderValue::from_str(&format!("{host}:{port}"))
                .map_err(|e| HttpClientError::InvalidRequest(e.to_string()))?,
            (Some(host), None) => HeaderValue::from_str(host)
                .map_err(|e| HttpClientError::InvalidRequest(e.to_string()))?,
            (None, _) => {
                return Err(HttpClientError::InvalidRequest(
                    "Outgoing URI has no host".to_string(),
                ));
            }
        };

        let headers = req.headers_mut();
        headers.insert(header::HOST, host_header_val);
        if !headers.contains_key(header::USER_AGENT) {
            headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
        }
        Ok(())
    }

    /// Inject the active span's trace context as W3C headers so the
    /// destination can join the distributed trace.
    fn inject_trace_context(req: &mut Request<AxumBody>) {
        let context = tracing::Span::current().context();
        global::get_text_map_propagator(|propagator| {
            propagator.inject_context(&context, &mut HeaderInjector(req.headers_mut()));
        });
    }
}

struct HeaderInjector<'a>(&'a mut hyper::HeaderMap);

impl opentelemetry::propagation::Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        if let Ok(name) = hyper::header::HeaderName::from_bytes(key.as_bytes())
            && let Ok(value) = HeaderValue::from_str(&value)
        {
            self.0.insert(name, value);
        }
    }
}

#[async_trait]
impl HttpClient for HttpClientAdapter {
    async fn forward(&self, mut req: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>> {
        Self::set_destination_headers(&mut req)?;
        Self::inject_trace_context(&mut req);

        let (mut parts, body) = req.into_parts();
        parts.version = Version::HTTP_11;

        tracing::debug!(
            "Forwarding {} {} (version pinned to HTTP/1.1, ALPN negotiates actual version)",
            parts.method,
            parts.uri
        );

        let outgoing_request = Request::from_parts(parts, body);
        let method_for_error_log = outgoing_request.method().clone();
        let uri_for_error_log = outgoing_request.uri().clone();

        match self.client.request(outgoing_request).await {
            Ok(response) => {
                tracing::Span::current().record("http.status_code", response.status().as_u16());

                let (mut parts, hyper_body) = response.into_parts();

                // The body is re-framed by the server side, so the upstream
                // Transfer-Encoding header must not be forwarded.
                parts.headers.remove(header::TRANSFER_ENCODING);

                Ok(Response::from_parts(parts, AxumBody::new(hyper_body)))
            }
            Err(e) => {
                tracing::error!(
                    "Error forwarding {} {}: {}",
                    method_for_error_log,
                    uri_for_error_log,
                    e
                );
                Err(HttpClientError::ConnectionError(format!(
                    "Request to {method_for_error_log} {uri_for_error_log} failed: {e}"
                )))
            }
        }
    }

    async fn probe(&self, url: &str, timeout_secs: u64) -> HttpClientResult<bool> {
        let request = Request::builder()
            .method("HEAD")
            .uri(url)
            .version(Version::HTTP_11)
            .body(AxumBody::empty())
            .map_err(|e| HttpClientError::InvalidRequest(e.to_string()))?;

        tracing::debug!("Probing destination health: {}", url);
        let timeout_duration = Duration::from_secs(timeout_secs);

        match timeout(timeout_duration, self.client.request(request)).await {
            Ok(Ok(response)) => {
                let is_healthy = response.status().is_success();
                // Consume the body to return the connection to the pool
                let _ = response.into_body().collect().await;
                tracing::debug!("Health probe for {} result: {}", url, is_healthy);
                Ok(is_healthy)
            }
            Ok(Err(err)) => {
                tracing::debug!("Health probe error for {}: {}", url, err);
                // Unreachable destinations are reported as unhealthy, not as errors
                Ok(false)
            }
            Err(_) => {
                tracing::debug!("Health probe timeout for {}", url);
                Err(HttpClientError::Timeout(timeout_secs))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_http_client_creation() {
        let client = HttpClientAdapter::new();
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_destination_headers_set_host_and_agent() {
        let mut req = Request::builder()
            .uri("http://games:8080/games/42")
            .body(AxumBody::empty())
            .unwrap();

        HttpClientAdapter::set_destination_headers(&mut req).unwrap();

        assert_eq!(req.headers().get(header::HOST).unwrap(), "games:8080");
        assert_eq!(
            req.headers().get(header::USER_AGENT).unwrap(),
            HeaderValue::from_static(USER_AGENT)
        );
    }

    #[tokio::test]
    async fn test_destination_headers_reject_missing_host() {
        let mut req = Request::builder()
            .uri("/relative/only")
            .body(AxumBody::empty())
            .unwrap();

        let result = HttpClientAdapter::set_destination_headers(&mut req);
        assert!(matches!(result, Err(HttpClientError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_probe_unreachable_destination_is_unhealthy() {
        let client = HttpClientAdapter::new().unwrap();
        // Nothing listens on this port; the probe reports unhealthy rather
        // than erroring.
        let result = client.probe("http://127.0.0.1:1/health", 2).await;
        match result {
            Ok(false) => {}
            other => panic!("Expected Ok(false) for unreachable destination, got {other:?}"),
        }
    }
}
