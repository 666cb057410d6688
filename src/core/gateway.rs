//! Core gateway orchestration service.
//!
//! The `GatewayService` aggregates one immutable configuration snapshot
//! (`GatewayConfig`) with runtime state (destination health, per-cluster
//! selectors). It provides:
//! * Longest‑prefix route lookup
//! * Upstream path construction (optional prefix rewrite)
//! * Health status queries & filtering
//! * Destination selection applying the cluster's load-balancing policy
//!
//! This layer deliberately avoids I/O and only manipulates in‑memory data so
//! it remains fast and easily testable in isolation. On configuration reload
//! a fresh instance is built and swapped in atomically.
use std::{collections::HashMap as StdHashMap, sync::Arc};

use scc::HashMap;

use crate::{
    config::{GatewayConfig, HealthCheckConfig, HealthStatus, RouteConfig},
    core::{
        cluster::{DestinationHealth, DestinationUrl},
        load_balancer::{Candidate, DestinationSelector, selector_for},
    },
};

struct ClusterState {
    destinations: Vec<Candidate>,
    selector: Box<dyn DestinationSelector>,
}

/// Central orchestrator for route matching, destination selection and health
/// status lookup. Construct with [`GatewayService::new`] by passing an
/// `Arc<GatewayConfig>`; all lookup structures are pre-built so the request
/// hot path performs no allocation beyond the selected candidate.
pub struct GatewayService {
    config: Arc<GatewayConfig>,
    destination_health: Arc<HashMap<String, DestinationHealth>>,
    probe_paths: StdHashMap<String, String>,
    clusters: StdHashMap<String, ClusterState>,
}

impl GatewayService {
    /// Create a new gateway service from a configuration snapshot.
    pub fn new(config: Arc<GatewayConfig>) -> Self {
        let destination_health = Arc::new(HashMap::new());
        let mut probe_paths = StdHashMap::new();
        let mut clusters = StdHashMap::new();

        for (cluster_id, cluster_config) in &config.proxy.clusters {
            let mut destinations = Vec::new();

            for (name, destination) in &cluster_config.destinations {
                let address = match DestinationUrl::new(&destination.address) {
                    Ok(address) => address,
                    Err(e) => {
                        tracing::error!(
                            "Skipping destination '{}' of cluster '{}': {}",
                            name,
                            cluster_id,
                            e
                        );
                        continue;
                    }
                };

                let _ = destination_health.insert_sync(
                    address.as_str().to_string(),
                    DestinationHealth::new(cluster_id.clone(), address.clone()),
                );

                if let Some(health_path) = &destination.health_path {
                    probe_paths.insert(address.as_str().to_string(), health_path.clone());
                }

                destinations.push(Candidate {
                    name: name.clone(),
                    address: address.as_str().to_string(),
                });
            }

            // Deterministic order so round-robin cycles are stable across restarts.
            destinations.sort_by(|a, b| a.name.cmp(&b.name));

            clusters.insert(
                cluster_id.clone(),
                ClusterState {
                    destinations,
                    selector: selector_for(cluster_config.policy),
                },
            );
        }

        Self {
            config,
            destination_health,
            probe_paths,
            clusters,
        }
    }

    /// The configuration snapshot this service was built from.
    pub fn config(&self) -> &Arc<GatewayConfig> {
        &self.config
    }

    /// Access the concurrent destination health map (mainly for the health
    /// checker and diagnostics).
    pub fn destination_health(&self) -> &HashMap<String, DestinationHealth> {
        &self.destination_health
    }

    /// Number of configured routes.
    pub fn route_count(&self) -> usize {
        self.config.proxy.routes.len()
    }

    /// Longest‑prefix match to find a route for an incoming path.
    pub fn find_route(&self, path: &str) -> Option<(&str, &RouteConfig)> {
        self.config
            .proxy
            .routes
            .iter()
            .filter(|(_, route)| path.starts_with(&route.path))
            .max_by_key(|(_, route)| route.path.len())
            .map(|(id, route)| (id.as_str(), route))
    }

    /// Build the path-and-query forwarded upstream for a matched route,
    /// applying the optional prefix rewrite.
    pub fn upstream_path_and_query(
        route: &RouteConfig,
        path: &str,
        query: Option<&str>,
    ) -> String {
        let rewritten = match &route.path_rewrite {
            Some(rewrite) => {
                let remainder = path.strip_prefix(&route.path).unwrap_or(path);
                if rewrite.ends_with('/') && remainder.starts_with('/') {
                    format!("{}{}", rewrite.trim_end_matches('/'), remainder)
                } else {
                    format!("{rewrite}{remainder}")
                }
            }
            None => path.to_string(),
        };

        match query {
            Some(query) => format!("{rewritten}?{query}"),
            None => rewritten,
        }
    }

    /// Return the global health check configuration.
    pub fn health_config(&self) -> &HealthCheckConfig {
        &self.config.health_check
    }

    /// Resolve the health probe path for a destination (per-destination
    /// override or the global default).
    pub fn probe_path(&self, address: &str) -> String {
        self.probe_paths
            .get(address)
            .cloned()
            .unwrap_or_else(|| self.config.health_check.path.clone())
    }

    /// Return the last observed health status for a destination (Healthy if
    /// unknown / untracked).
    pub fn destination_status(&self, address: &str) -> HealthStatus {
        self.destination_health
            .read_sync(address, |_, health| health.status())
            .unwrap_or(HealthStatus::Healthy)
    }

    /// Filter a cluster's destinations down to healthy ones (all of them if
    /// health checking is disabled).
    pub fn healthy_candidates(&self, cluster_id: &str) -> Vec<Candidate> {
        let Some(cluster) = self.clusters.get(cluster_id) else {
            return Vec::new();
        };

        if !self.config.health_check.enabled {
            return cluster.destinations.clone();
        }

        cluster
            .destinations
            .iter()
            .filter(|candidate| {
                self.destination_status(&candidate.address) == HealthStatus::Healthy
            })
            .cloned()
            .collect()
    }

    /// Select a destination for a cluster, applying health filtering and the
    /// cluster's load-balancing policy.
    pub fn select_destination(&self, cluster_id: &str) -> Option<Candidate> {
        let cluster = self.clusters.get(cluster_id)?;
        let healthy = self.healthy_candidates(cluster_id);
        cluster.selector.pick(&healthy)
    }

    /// Total number of tracked destinations.
    pub fn destination_count(&self) -> usize {
        self.destination_health.len()
    }

    /// Count of currently healthy destinations (or total if health checks
    /// are disabled).
    pub fn healthy_destination_count(&self) -> usize {
        if !self.config.health_check.enabled {
            return self.destination_health.len();
        }

        let mut count = 0;
        self.destination_health.iter_sync(|_, health| {
            if health.status() == HealthStatus::Healthy {
                count += 1;
            }
            true
        });
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClusterConfig, DestinationConfig, LoadBalancePolicy};

    fn two_destination_config() -> GatewayConfig {
        let mut destinations = StdHashMap::new();
        destinations.insert(
            "a".to_string(),
            DestinationConfig {
                address: "http://games-a:8080".to_string(),
                health_path: Some("/healthz".to_string()),
            },
        );
        destinations.insert(
            "b".to_string(),
            DestinationConfig {
                address: "http://games-b:8080".to_string(),
                health_path: None,
            },
        );

        GatewayConfig::builder()
            .route(
                "games",
                RouteConfig {
                    path: "/games".to_string(),
                    cluster: "games".to_string(),
                    path_rewrite: None,
                },
            )
            .route(
                "games-admin",
                RouteConfig {
                    path: "/games/admin".to_string(),
                    cluster: "admin".to_string(),
                    path_rewrite: Some("/".to_string()),
                },
            )
            .cluster(
                "games",
                ClusterConfig {
                    destinations,
                    policy: LoadBalancePolicy::RoundRobin,
                },
            )
            .single_destination_cluster("admin", "http://admin:9000")
            .build()
    }

    #[test]
    fn test_longest_prefix_wins() {
        let gateway = GatewayService::new(Arc::new(two_destination_config()));

        let (id, route) = gateway.find_route("/games/admin/users").unwrap();
        assert_eq!(id, "games-admin");
        assert_eq!(route.cluster, "admin");

        let (id, _) = gateway.find_route("/games/42").unwrap();
        assert_eq!(id, "games");

        assert!(gateway.find_route("/payments").is_none());
    }

    #[test]
    fn test_upstream_path_passthrough_and_rewrite() {
        let passthrough = RouteConfig {
            path: "/games".to_string(),
            cluster: "games".to_string(),
            path_rewrite: None,
        };
        assert_eq!(
            GatewayService::upstream_path_and_query(&passthrough, "/games/42", Some("full=1")),
            "/games/42?full=1"
        );

        let rewritten = RouteConfig {
            path: "/games/admin".to_string(),
            cluster: "admin".to_string(),
            path_rewrite: Some("/".to_string()),
        };
        assert_eq!(
            GatewayService::upstream_path_and_query(&rewritten, "/games/admin/users", None),
            "/users"
        );
    }

    #[test]
    fn test_round_robin_over_cluster() {
        let gateway = GatewayService::new(Arc::new(two_destination_config()));

        let first = gateway.select_destination("games").unwrap();
        let second = gateway.select_destination("games").unwrap();
        let third = gateway.select_destination("games").unwrap();

        // Sorted by name: a, b, then wrap back to a.
        assert_eq!(first.name, "a");
        assert_eq!(second.name, "b");
        assert_eq!(third.name, "a");
    }

    #[test]
    fn test_unhealthy_destinations_are_skipped() {
        let gateway = GatewayService::new(Arc::new(two_destination_config()));

        gateway
            .destination_health()
            .read_sync("http://games-a:8080", |_, health| health.mark_unhealthy())
            .unwrap();

        for _ in 0..4 {
            let picked = gateway.select_destination("games").unwrap();
            assert_eq!(picked.address, "http://games-b:8080");
        }

        gateway
            .destination_health()
            .read_sync("http://games-b:8080", |_, health| health.mark_unhealthy())
            .unwrap();
        assert!(gateway.select_destination("games").is_none());
    }

    #[test]
    fn test_health_filtering_disabled_uses_all() {
        let mut config = two_destination_config();
        config.health_check.enabled = false;
        let gateway = GatewayService::new(Arc::new(config));

        gateway
            .destination_health()
            .read_sync("http://games-a:8080", |_, health| health.mark_unhealthy())
            .unwrap();

        assert_eq!(gateway.healthy_candidates("games").len(), 2);
        assert_eq!(gateway.healthy_destination_count(), 3);
    }

    #[test]
    fn test_probe_path_resolution() {
        let gateway = GatewayService::new(Arc::new(two_destination_config()));

        assert_eq!(gateway.probe_path("http://games-a:8080"), "/healthz");
        assert_eq!(gateway.probe_path("http://games-b:8080"), "/health");
    }

    #[test]
    fn test_unknown_cluster_selects_nothing() {
        let gateway = GatewayService::new(Arc::new(two_destination_config()));
        assert!(gateway.select_destination("missing").is_none());
    }
}
