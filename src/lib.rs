//! fcg-gateway - Edge HTTP gateway for the FCG platform.
//!
//! The gateway is driven entirely by external configuration: a reverse-proxy
//! section (routes matched by path prefix, clusters of destinations with a
//! load-balancing policy) plus ambient sections for logging, health probing
//! and OTLP trace export. Besides forwarding, it exposes three fixed
//! endpoints: a service banner on `/`, aggregate health on `/health` and a
//! Prometheus exposition on `/metrics`.
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use fcg_gateway::{config::GatewayConfig, core::GatewayService};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let cfg: GatewayConfig = fcg_gateway::config::loader::load_config("gateway.toml").await?;
//! let gateway = Arc::new(GatewayService::new(Arc::new(cfg)));
//! // Wire this into the provided router via adapters::build_router (see binary crate)
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations)
//! while keeping business logic inside `core`. End users should prefer the
//! re‑exports documented below instead of reaching into internal modules
//! directly.
//!
//! # Error Handling
//! All fallible APIs return `eyre::Result<T>` or a domain specific error type.
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

// These modules are implementation details and should not be directly used by users
pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{AppState, FileConfigProvider, HealthChecker, HttpClientAdapter, build_router},
    config::SERVICE_NAME,
    core::GatewayService,
    ports::http_client::HttpClient,
    utils::GracefulShutdown,
};
