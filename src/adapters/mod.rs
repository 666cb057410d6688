pub mod config_provider;
pub mod health_checker;
pub mod http_client;
pub mod http_handler;
pub mod middleware;

/// Re-export commonly used types from adapters
pub use config_provider::FileConfigProvider;
pub use health_checker::HealthChecker;
pub use http_client::HttpClientAdapter;
pub use http_handler::{AppState, build_router};
