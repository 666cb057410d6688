use std::net::SocketAddr;

use url::Url;

use crate::config::models::{ClusterConfig, GatewayConfig, HealthCheckConfig, RouteConfig};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Route '{route}' references unknown cluster '{cluster}'")]
    DanglingCluster { route: String, cluster: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Gateway configuration validator
pub struct GatewayConfigValidator;

impl GatewayConfigValidator {
    /// Validate the entire gateway configuration, collecting every error.
    pub fn validate(config: &GatewayConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        for (route_id, route) in &config.proxy.routes {
            if let Err(mut route_errors) = Self::validate_route(route_id, route) {
                errors.append(&mut route_errors);
            }
            if !config.proxy.clusters.contains_key(&route.cluster) {
                errors.push(ValidationError::DanglingCluster {
                    route: route_id.clone(),
                    cluster: route.cluster.clone(),
                });
            }
        }

        for (cluster_id, cluster) in &config.proxy.clusters {
            if let Err(mut cluster_errors) = Self::validate_cluster(cluster_id, cluster) {
                errors.append(&mut cluster_errors);
            }
        }

        if let Err(mut health_errors) = Self::validate_health_check(&config.health_check) {
            errors.append(&mut health_errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn validate_route(route_id: &str, route: &RouteConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if !route.path.starts_with('/') {
            errors.push(ValidationError::InvalidField {
                field: format!("route '{route_id}' path"),
                message: "Route paths must start with '/'".to_string(),
            });
        }

        if let Some(rewrite) = &route.path_rewrite
            && !rewrite.starts_with('/')
        {
            errors.push(ValidationError::InvalidField {
                field: format!("route '{route_id}' path_rewrite"),
                message: "Path rewrites must start with '/'".to_string(),
            });
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    fn validate_cluster(
        cluster_id: &str,
        cluster: &ClusterConfig,
    ) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if cluster.destinations.is_empty() {
            errors.push(ValidationError::MissingField {
                field: format!("cluster '{cluster_id}' destinations"),
            });
        }

        for (name, destination) in &cluster.destinations {
            if let Err(e) = Self::validate_address(
                &destination.address,
                &format!("cluster '{cluster_id}' destination '{name}'"),
            ) {
                errors.push(e);
            }

            if let Some(health_path) = &destination.health_path
                && !health_path.starts_with('/')
            {
                errors.push(ValidationError::InvalidField {
                    field: format!("cluster '{cluster_id}' destination '{name}' health_path"),
                    message: "Health probe paths must start with '/'".to_string(),
                });
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    fn validate_address(address: &str, field: &str) -> ValidationResult<()> {
        match Url::parse(address) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {
                if url.host_str().is_none() {
                    return Err(ValidationError::InvalidField {
                        field: field.to_string(),
                        message: format!("Address '{address}' has no host"),
                    });
                }
                Ok(())
            }
            Ok(url) => Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: format!(
                    "Address '{address}' must use http or https, got '{}'",
                    url.scheme()
                ),
            }),
            Err(e) => Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: format!("Address '{address}' is not a valid URL: {e}"),
            }),
        }
    }

    fn validate_health_check(config: &HealthCheckConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if config.enabled {
            if config.interval_secs == 0 {
                errors.push(ValidationError::InvalidField {
                    field: "health_check.interval_secs".to_string(),
                    message: "Interval must be greater than zero".to_string(),
                });
            }
            if config.unhealthy_threshold == 0 || config.healthy_threshold == 0 {
                errors.push(ValidationError::InvalidField {
                    field: "health_check thresholds".to_string(),
                    message: "Thresholds must be at least 1".to_string(),
                });
            }
            if !config.path.starts_with('/') {
                errors.push(ValidationError::InvalidField {
                    field: "health_check.path".to_string(),
                    message: "Health probe paths must start with '/'".to_string(),
                });
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        errors
            .iter()
            .enumerate()
            .map(|(i, e)| format!("  {}. {e}", i + 1))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::RouteConfig;

    fn valid_config() -> GatewayConfig {
        GatewayConfig::builder()
            .listen_addr("127.0.0.1:8080")
            .route(
                "games",
                RouteConfig {
                    path: "/games".to_string(),
                    cluster: "games".to_string(),
                    path_rewrite: None,
                },
            )
            .single_destination_cluster("games", "http://games:8080")
            .build()
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(GatewayConfigValidator::validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_empty_routes_are_allowed() {
        // A gateway with only the fixed endpoints is a valid deployment.
        let config = GatewayConfig::default();
        assert!(GatewayConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_invalid_listen_address_rejected() {
        let mut config = valid_config();
        config.listen_addr = "not-an-address".to_string();
        let err = GatewayConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("listen address"));
    }

    #[test]
    fn test_dangling_cluster_reference_rejected() {
        let mut config = valid_config();
        config
            .proxy
            .routes
            .get_mut("games")
            .unwrap()
            .cluster = "missing".to_string();
        let err = GatewayConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("unknown cluster 'missing'"));
    }

    #[test]
    fn test_bad_destination_address_rejected() {
        let config = GatewayConfig::builder()
            .route(
                "games",
                RouteConfig {
                    path: "/games".to_string(),
                    cluster: "games".to_string(),
                    path_rewrite: None,
                },
            )
            .single_destination_cluster("games", "ftp://games:8080")
            .build();
        let err = GatewayConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("must use http or https"));
    }

    #[test]
    fn test_empty_cluster_rejected() {
        let mut config = valid_config();
        config
            .proxy
            .clusters
            .get_mut("games")
            .unwrap()
            .destinations
            .clear();
        assert!(GatewayConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_zero_interval_rejected_when_enabled() {
        let mut config = valid_config();
        config.health_check.interval_secs = 0;
        assert!(GatewayConfigValidator::validate(&config).is_err());

        config.health_check.enabled = false;
        assert!(GatewayConfigValidator::validate(&config).is_ok());
    }
}
