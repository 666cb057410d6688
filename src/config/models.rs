//! Configuration data structures for the gateway.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files.
//! They are intentionally serde‑friendly and include defaults so that minimal
//! configs remain concise. The `proxy` section is the heart of the file: named
//! routes matched by path prefix, each pointing at a cluster of destinations.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Service name reported in the banner, logs, metric labels and the OTLP resource.
pub const SERVICE_NAME: &str = "fcg-gateway";

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

/// Top-level gateway configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Reverse-proxy section: routes and clusters.
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub health_check: HealthCheckConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub opentelemetry: OpenTelemetryConfig,
}

impl GatewayConfig {
    /// Create a new gateway configuration builder.
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            proxy: ProxyConfig::default(),
            health_check: HealthCheckConfig::default(),
            logging: LoggingConfig::default(),
            opentelemetry: OpenTelemetryConfig::default(),
        }
    }
}

/// The reverse-proxy configuration section.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Route definitions keyed by route id.
    pub routes: HashMap<String, RouteConfig>,
    /// Cluster definitions keyed by cluster id.
    pub clusters: HashMap<String, ClusterConfig>,
}

/// A single route: requests whose path starts with `path` are forwarded to
/// a destination of `cluster`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RouteConfig {
    /// Path prefix to match (longest prefix wins across routes).
    pub path: String,
    /// Cluster id the route forwards to.
    pub cluster: String,
    /// Optional replacement for the matched prefix before forwarding.
    #[serde(default)]
    pub path_rewrite: Option<String>,
}

/// A named set of destinations sharing a load-balancing policy.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ClusterConfig {
    /// Destinations keyed by destination name.
    pub destinations: HashMap<String, DestinationConfig>,
    #[serde(default)]
    pub policy: LoadBalancePolicy,
}

/// One backend address inside a cluster.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DestinationConfig {
    /// Base URL of the backend (http:// or https://, no trailing slash needed).
    pub address: String,
    /// Health probe path override for this destination.
    #[serde(default)]
    pub health_path: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancePolicy {
    #[default]
    RoundRobin,
    Random,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HealthCheckConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub timeout_secs: u64,
    /// Default probe path, used unless a destination overrides it.
    pub path: String,
    pub unhealthy_threshold: u32,
    pub healthy_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 10,
            timeout_secs: 2,
            path: "/health".to_string(),
            unhealthy_threshold: 3,
            healthy_threshold: 2,
        }
    }
}

/// Structured logging configuration, applied once at startup.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level directive, overridable via `RUST_LOG`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Json,
    Pretty,
}

/// OTLP trace export configuration, applied once at startup.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct OpenTelemetryConfig {
    pub enabled: bool,
    /// gRPC endpoint of the trace collector.
    pub otlp_endpoint: String,
}

impl Default for OpenTelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            otlp_endpoint: "http://jaeger:4317".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    #[serde(rename = "healthy")]
    Healthy,
    #[serde(rename = "unhealthy")]
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Builder for [`GatewayConfig`], mainly useful for tests and embedding.
#[derive(Default)]
pub struct GatewayConfigBuilder {
    listen_addr: Option<String>,
    routes: HashMap<String, RouteConfig>,
    clusters: HashMap<String, ClusterConfig>,
    health_check: Option<HealthCheckConfig>,
    logging: Option<LoggingConfig>,
    opentelemetry: Option<OpenTelemetryConfig>,
}

impl GatewayConfigBuilder {
    /// Set the listen address.
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = Some(addr.into());
        self
    }

    /// Add a route with the given id.
    pub fn route(mut self, id: impl Into<String>, route: RouteConfig) -> Self {
        self.routes.insert(id.into(), route);
        self
    }

    /// Add a cluster with the given id.
    pub fn cluster(mut self, id: impl Into<String>, cluster: ClusterConfig) -> Self {
        self.clusters.insert(id.into(), cluster);
        self
    }

    /// Add a single-destination cluster, the common case in small configs.
    pub fn single_destination_cluster(
        self,
        id: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        let mut destinations = HashMap::new();
        destinations.insert(
            "default".to_string(),
            DestinationConfig {
                address: address.into(),
                health_path: None,
            },
        );
        self.cluster(
            id,
            ClusterConfig {
                destinations,
                policy: LoadBalancePolicy::RoundRobin,
            },
        )
    }

    /// Set health check configuration.
    pub fn health_check(mut self, config: HealthCheckConfig) -> Self {
        self.health_check = Some(config);
        self
    }

    /// Set logging configuration.
    pub fn logging(mut self, config: LoggingConfig) -> Self {
        self.logging = Some(config);
        self
    }

    /// Set OTLP export configuration.
    pub fn opentelemetry(mut self, config: OpenTelemetryConfig) -> Self {
        self.opentelemetry = Some(config);
        self
    }

    /// Build the final [`GatewayConfig`].
    pub fn build(self) -> GatewayConfig {
        GatewayConfig {
            listen_addr: self.listen_addr.unwrap_or_else(default_listen_addr),
            proxy: ProxyConfig {
                routes: self.routes,
                clusters: self.clusters,
            },
            health_check: self.health_check.unwrap_or_default(),
            logging: self.logging.unwrap_or_default(),
            opentelemetry: self.opentelemetry.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_usable() {
        let config = GatewayConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert!(config.proxy.routes.is_empty());
        assert!(config.health_check.enabled);
        assert_eq!(config.opentelemetry.otlp_endpoint, "http://jaeger:4317");
    }

    #[test]
    fn test_builder_assembles_proxy_section() {
        let config = GatewayConfig::builder()
            .listen_addr("127.0.0.1:9000")
            .route(
                "games",
                RouteConfig {
                    path: "/games".to_string(),
                    cluster: "games".to_string(),
                    path_rewrite: None,
                },
            )
            .single_destination_cluster("games", "http://games:8080")
            .build();

        assert_eq!(config.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.proxy.routes.len(), 1);
        assert_eq!(
            config.proxy.clusters["games"].destinations["default"].address,
            "http://games:8080"
        );
    }

    #[test]
    fn test_route_config_deserializes_without_rewrite() {
        let route: RouteConfig = serde_json::from_value(serde_json::json!({
            "path": "/api",
            "cluster": "api"
        }))
        .unwrap();
        assert_eq!(route.path, "/api");
        assert_eq!(route.cluster, "api");
        assert_eq!(route.path_rewrite, None);
    }

    #[test]
    fn test_load_balance_policy_names() {
        let policy: LoadBalancePolicy = serde_json::from_value(serde_json::json!("random")).unwrap();
        assert_eq!(policy, LoadBalancePolicy::Random);
        assert_eq!(LoadBalancePolicy::default(), LoadBalancePolicy::RoundRobin);
    }
}
