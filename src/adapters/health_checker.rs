use std::{sync::Arc, time::Duration};

use eyre::Result;
use tokio::time::sleep;

use crate::{
    config::{HealthCheckConfig, HealthStatus},
    core::{GatewayService, cluster::DestinationHealth},
    ports::http_client::HttpClient,
};

/// Periodic health prober for cluster destinations.
///
/// One checker instance is bound to one gateway snapshot; the config
/// watcher aborts it and starts a fresh one whenever the configuration is
/// reloaded.
pub struct HealthChecker {
    gateway: Arc<GatewayService>,
    http_client: Arc<dyn HttpClient>,
}

impl HealthChecker {
    pub fn new(gateway: Arc<GatewayService>, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            gateway,
            http_client,
        }
    }

    /// Run the probe loop until aborted.
    pub async fn run(&self) -> Result<()> {
        let health_config = self.gateway.health_config();

        if !health_config.enabled {
            tracing::info!("Destination health checking is disabled");
            return Ok(());
        }

        let interval = Duration::from_secs(health_config.interval_secs);
        let timeout_secs = health_config.timeout_secs;

        tracing::info!(
            "Starting health checker with interval: {}s, timeout: {}s, default path: {}",
            health_config.interval_secs,
            health_config.timeout_secs,
            health_config.path
        );

        loop {
            // Sleep first so freshly started backends get a grace period.
            sleep(interval).await;

            let destination_health = self.gateway.destination_health();
            let mut addresses = Vec::new();
            destination_health.iter_sync(|address, _| {
                addresses.push(address.clone());
                true
            });

            tracing::debug!("Probing {} destinations", addresses.len());

            for address in addresses {
                let probe_url = format!("{}{}", address, self.gateway.probe_path(&address));

                match self.http_client.probe(&probe_url, timeout_secs).await {
                    Ok(is_healthy) => {
                        let _ = destination_health.read_sync(&address, |_, health| {
                            if is_healthy {
                                Self::handle_probe_success(&address, health, health_config);
                            } else {
                                Self::handle_probe_failure(
                                    &address,
                                    health,
                                    health_config,
                                    "destination reported unhealthy",
                                );
                            }
                        });
                    }
                    Err(err) => {
                        let _ = destination_health.read_sync(&address, |_, health| {
                            Self::handle_probe_failure(
                                &address,
                                health,
                                health_config,
                                &format!("probe error: {err}"),
                            );
                        });
                    }
                }
            }

            tracing::debug!("Health probe cycle completed");
        }
    }

    /// Handle a successful probe, applying the healthy threshold.
    fn handle_probe_success(
        address: &str,
        health: &DestinationHealth,
        health_config: &HealthCheckConfig,
    ) {
        let successes = health
            .consecutive_successes
            .fetch_add(1, std::sync::atomic::Ordering::AcqRel)
            + 1;
        health
            .consecutive_failures
            .store(0, std::sync::atomic::Ordering::Release);

        tracing::debug!(
            "Probe for {} succeeded ({} consecutive successes)",
            address,
            successes
        );

        if successes >= health_config.healthy_threshold
            && health.status() == HealthStatus::Unhealthy
        {
            tracing::info!(
                "Destination {} is now HEALTHY (after {} consecutive successes)",
                address,
                successes
            );
            health.mark_healthy();
        }
    }

    /// Handle a failed probe, applying the unhealthy threshold.
    fn handle_probe_failure(
        address: &str,
        health: &DestinationHealth,
        health_config: &HealthCheckConfig,
        reason: &str,
    ) {
        let failures = health
            .consecutive_failures
            .fetch_add(1, std::sync::atomic::Ordering::AcqRel)
            + 1;
        health
            .consecutive_successes
            .store(0, std::sync::atomic::Ordering::Release);

        tracing::info!(
            "Probe failed for {}: {} (failures: {}/{})",
            address,
            reason,
            failures,
            health_config.unhealthy_threshold
        );

        if failures >= health_config.unhealthy_threshold
            && health.status() == HealthStatus::Healthy
        {
            tracing::warn!(
                "Destination {} is now UNHEALTHY (after {} consecutive failures): {}",
                address,
                failures,
                reason
            );
            health.mark_unhealthy();
        }
    }
}
