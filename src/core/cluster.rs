use std::{
    fmt,
    str::FromStr,
    sync::atomic::{AtomicU8, AtomicU32, Ordering},
};

use thiserror::Error;

use crate::{config::HealthStatus, metrics::set_destination_health};

const HEALTH_STATUS_UNHEALTHY: u8 = 0;
const HEALTH_STATUS_HEALTHY: u8 = 1;

/// Errors related to cluster destinations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ClusterError {
    /// Error when a destination address is invalid
    #[error("Invalid destination address: {0}")]
    InvalidAddress(String),
}

/// Result type for cluster operations
pub type ClusterResult<T> = Result<T, ClusterError>;

/// A type-safe representation of a destination base URL
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DestinationUrl {
    address: String,
    is_secure: bool,
}

impl DestinationUrl {
    /// Creates a new DestinationUrl if the provided string is an http(s) URL.
    pub fn new(address: &str) -> ClusterResult<Self> {
        let is_secure = address.starts_with("https://");
        let is_http = address.starts_with("http://");

        if !is_secure && !is_http {
            return Err(ClusterError::InvalidAddress(format!(
                "Destination address must start with http:// or https://, got: {address}"
            )));
        }

        Ok(DestinationUrl {
            // A trailing slash would double up when the request path is appended.
            address: address.trim_end_matches('/').to_string(),
            is_secure,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.address
    }

    pub fn is_secure(&self) -> bool {
        self.is_secure
    }
}

impl FromStr for DestinationUrl {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DestinationUrl::new(s)
    }
}

impl fmt::Display for DestinationUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}

/// Tracks the observed health of one destination inside a cluster.
///
/// Status transitions are driven by the health checker through
/// [`mark_healthy`](Self::mark_healthy) / [`mark_unhealthy`](Self::mark_unhealthy);
/// the consecutive counters implement the threshold hysteresis.
#[derive(Debug)]
pub struct DestinationHealth {
    cluster: String,
    address: DestinationUrl,
    status: AtomicU8,
    pub consecutive_successes: AtomicU32,
    pub consecutive_failures: AtomicU32,
}

impl DestinationHealth {
    /// Creates a new DestinationHealth instance, initialized as healthy so
    /// that traffic flows before the first probe cycle completes.
    pub fn new(cluster: impl Into<String>, address: DestinationUrl) -> Self {
        Self {
            cluster: cluster.into(),
            address,
            status: AtomicU8::new(HEALTH_STATUS_HEALTHY),
            consecutive_successes: AtomicU32::new(0),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    /// Cluster id this destination belongs to.
    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    /// Destination base URL.
    pub fn address(&self) -> &DestinationUrl {
        &self.address
    }

    /// Get the current health status.
    pub fn status(&self) -> HealthStatus {
        if self.status.load(Ordering::Acquire) == HEALTH_STATUS_HEALTHY {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }

    /// Mark the destination as healthy. The consecutive counters are owned
    /// by the health checker and stay untouched here.
    pub fn mark_healthy(&self) {
        self.status.store(HEALTH_STATUS_HEALTHY, Ordering::Release);
        set_destination_health(&self.cluster, self.address.as_str(), true);
    }

    /// Mark the destination as unhealthy.
    pub fn mark_unhealthy(&self) {
        self.status
            .store(HEALTH_STATUS_UNHEALTHY, Ordering::Release);
        set_destination_health(&self.cluster, self.address.as_str(), false);
    }

    pub fn consecutive_successes(&self) -> u32 {
        self.consecutive_successes.load(Ordering::Relaxed)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }
}
