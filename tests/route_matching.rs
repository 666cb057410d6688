// Integration tests for route matching and destination selection
#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Arc};

    use fcg_gateway::{
        config::{
            ClusterConfig, DestinationConfig, GatewayConfig, LoadBalancePolicy, RouteConfig,
        },
        core::GatewayService,
    };

    fn cluster(addresses: &[(&str, &str)], policy: LoadBalancePolicy) -> ClusterConfig {
        let mut destinations = HashMap::new();
        for (name, address) in addresses {
            destinations.insert(
                name.to_string(),
                DestinationConfig {
                    address: address.to_string(),
                    health_path: None,
                },
            );
        }
        ClusterConfig {
            destinations,
            policy,
        }
    }

    fn platform_config() -> GatewayConfig {
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
            .route(
                "games-v2",
                RouteConfig {
                    path: "/games/v2".to_string(),
                    cluster: "games-v2".to_string(),
                    path_rewrite: Some("/".to_string()),
                },
            )
            .route(
                "users",
                RouteConfig {
                    path: "/users".to_string(),
                    cluster: "users".to_string(),
                    path_rewrite: None,
                },
            )
            .cluster(
                "games",
                cluster(&[("primary", "http://games:8080")], LoadBalancePolicy::RoundRobin),
            )
            .cluster(
                "games-v2",
                cluster(
                    &[("canary", "http://games-v2:8080")],
                    LoadBalancePolicy::RoundRobin,
                ),
            )
            .cluster(
                "users",
                cluster(
                    &[
                        ("a", "http://users-a:8080"),
                        ("b", "http://users-b:8080"),
                    ],
                    LoadBalancePolicy::RoundRobin,
                ),
            )
            .build()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_longest_prefix_route_wins() {
        let gateway = GatewayService::new(Arc::new(platform_config()));

        let (route_id, route) = gateway.find_route("/games/v2/leaderboard").unwrap();
        assert_eq!(route_id, "games-v2");
        assert_eq!(route.cluster, "games-v2");

        let (route_id, route) = gateway.find_route("/games/42").unwrap();
        assert_eq!(route_id, "games");
        assert_eq!(route.cluster, "games");

        let (route_id, _) = gateway.find_route("/users/7/library").unwrap();
        assert_eq!(route_id, "users");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unconfigured_path_has_no_route() {
        let gateway = GatewayService::new(Arc::new(platform_config()));

        assert!(gateway.find_route("/payments").is_none());
        assert!(gateway.find_route("/").is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_prefix_rewrite_applied_to_upstream_path() {
        let gateway = GatewayService::new(Arc::new(platform_config()));

        let (_, route) = gateway.find_route("/games/v2/leaderboard").unwrap();
        let upstream = GatewayService::upstream_path_and_query(
            route,
            "/games/v2/leaderboard",
            Some("top=10"),
        );
        assert_eq!(upstream, "/leaderboard?top=10");

        let (_, route) = gateway.find_route("/games/42").unwrap();
        let upstream = GatewayService::upstream_path_and_query(route, "/games/42", None);
        assert_eq!(upstream, "/games/42");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_round_robin_cycles_cluster_destinations() {
        let gateway = GatewayService::new(Arc::new(platform_config()));

        let picks: Vec<String> = (0..4)
            .map(|_| gateway.select_destination("users").unwrap().name)
            .collect();
        assert_eq!(picks, vec!["a", "b", "a", "b"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_selection_skips_unhealthy_destinations() {
        let gateway = GatewayService::new(Arc::new(platform_config()));

        gateway
            .destination_health()
            .read_sync("http://users-a:8080", |_, health| health.mark_unhealthy())
            .unwrap();

        for _ in 0..4 {
            let picked = gateway.select_destination("users").unwrap();
            assert_eq!(picked.address, "http://users-b:8080");
        }

        gateway
            .destination_health()
            .read_sync("http://users-b:8080", |_, health| health.mark_unhealthy())
            .unwrap();
        assert!(gateway.select_destination("users").is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_random_policy_stays_within_cluster() {
        let mut config = platform_config();
        config.proxy.clusters.get_mut("users").unwrap().policy = LoadBalancePolicy::Random;
        let gateway = GatewayService::new(Arc::new(config));

        for _ in 0..16 {
            let picked = gateway.select_destination("users").unwrap();
            assert!(picked.address.starts_with("http://users-"));
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_same_prefix_different_clusters_after_reload() {
        // Simulates a reload swapping a route onto a different cluster: a new
        // service instance is built from the new config snapshot.
        let gateway = GatewayService::new(Arc::new(platform_config()));
        let (_, route) = gateway.find_route("/games/42").unwrap();
        assert_eq!(route.cluster, "games");

        let mut reloaded = platform_config();
        reloaded.proxy.routes.get_mut("games").unwrap().cluster = "games-v2".to_string();
        let gateway = GatewayService::new(Arc::new(reloaded));
        let (_, route) = gateway.find_route("/games/42").unwrap();
        assert_eq!(route.cluster, "games-v2");
    }
}
