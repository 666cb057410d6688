use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;

use crate::config::LoadBalancePolicy;

/// A candidate destination offered to a selector: configured name plus
/// resolved base address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub name: String,
    pub address: String,
}

/// Trait defining the interface for destination selection strategies.
/// A selector instance is owned by one cluster, so strategies may carry
/// per-cluster state (the round-robin cursor).
pub trait DestinationSelector: Send + Sync + 'static {
    /// Pick a destination from the healthy candidates.
    fn pick(&self, candidates: &[Candidate]) -> Option<Candidate>;

    fn boxed(self) -> Box<dyn DestinationSelector>
    where
        Self: Sized,
    {
        Box::new(self)
    }
}

/// Round-robin selection with a per-cluster cursor.
pub struct RoundRobinSelector {
    cursor: AtomicUsize,
}

impl Default for RoundRobinSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl RoundRobinSelector {
    pub fn new() -> Self {
        Self {
            cursor: AtomicUsize::new(0),
        }
    }
}

impl DestinationSelector for RoundRobinSelector {
    fn pick(&self, candidates: &[Candidate]) -> Option<Candidate> {
        if candidates.is_empty() {
            return None;
        }
        let count = self.cursor.fetch_add(1, Ordering::Relaxed);
        candidates.get(count % candidates.len()).cloned()
    }
}

/// Uniform random selection.
pub struct RandomSelector;

impl Default for RandomSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSelector {
    pub fn new() -> Self {
        Self
    }
}

impl DestinationSelector for RandomSelector {
    fn pick(&self, candidates: &[Candidate]) -> Option<Candidate> {
        if candidates.is_empty() {
            return None;
        }
        let index = rand::rng().random_range(0..candidates.len());
        candidates.get(index).cloned()
    }
}

/// Create a selector for the configured cluster policy.
pub fn selector_for(policy: LoadBalancePolicy) -> Box<dyn DestinationSelector> {
    match policy {
        LoadBalancePolicy::RoundRobin => RoundRobinSelector::new().boxed(),
        LoadBalancePolicy::Random => RandomSelector::new().boxed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(addresses: &[&str]) -> Vec<Candidate> {
        addresses
            .iter()
            .enumerate()
            .map(|(i, address)| Candidate {
                name: format!("d{i}"),
                address: address.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_round_robin_cycles_in_order() {
        let selector = RoundRobinSelector::new();
        let candidates = candidates(&[
            "http://a:8080",
            "http://b:8080",
            "http://c:8080",
        ]);

        assert_eq!(
            selector.pick(&candidates).unwrap().address,
            "http://a:8080"
        );
        assert_eq!(
            selector.pick(&candidates).unwrap().address,
            "http://b:8080"
        );
        assert_eq!(
            selector.pick(&candidates).unwrap().address,
            "http://c:8080"
        );
        // Wraps around
        assert_eq!(
            selector.pick(&candidates).unwrap().address,
            "http://a:8080"
        );
    }

    #[test]
    fn test_round_robin_empty_candidates() {
        let selector = RoundRobinSelector::new();
        assert_eq!(selector.pick(&[]), None);
    }

    #[test]
    fn test_random_stays_within_set() {
        let selector = RandomSelector::new();
        let candidates = candidates(&["http://a:8080", "http://b:8080"]);

        for _ in 0..16 {
            let picked = selector.pick(&candidates).unwrap();
            assert!(candidates.contains(&picked));
        }
    }

    #[test]
    fn test_random_empty_candidates() {
        let selector = RandomSelector::new();
        assert_eq!(selector.pick(&[]), None);
    }

    #[test]
    fn test_selector_for_policy() {
        let candidates = candidates(&["http://a:8080", "http://b:8080"]);

        let rr = selector_for(LoadBalancePolicy::RoundRobin);
        assert!(rr.pick(&candidates).is_some());

        let random = selector_for(LoadBalancePolicy::Random);
        assert!(random.pick(&candidates).is_some());
    }
}
