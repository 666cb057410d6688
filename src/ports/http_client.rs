use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{Request, Response, StatusCode};
use thiserror::Error;

/// Custom error type for upstream HTTP operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpClientError {
    /// Error when connection to a destination fails
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error when a request times out
    #[error("Timeout error after {0} seconds")]
    Timeout(u64),

    /// Error when a request is invalid
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Error when a destination returns an error status code
    #[error("Destination returned error status: {status}, url: {url}")]
    DestinationError {
        /// The URL that was requested
        url: String,
        /// The status code returned by the destination
        status: StatusCode,
    },
}

/// Result type alias for upstream HTTP operations
pub type HttpClientResult<T> = Result<T, HttpClientError>;

/// HttpClient defines the port (interface) for forwarding requests to
/// cluster destinations and probing their health.
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Forward an HTTP request to a destination, streaming the response back.
    async fn forward(&self, req: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>>;

    /// Probe a destination health endpoint.
    ///
    /// Returns `Ok(true)` when the destination answered with a success
    /// status, `Ok(false)` when it answered with an error or was
    /// unreachable, and `Err` only on timeout or malformed input.
    async fn probe(&self, url: &str, timeout_secs: u64) -> HttpClientResult<bool>;
}
