use std::collections::HashMap;

use tokio::sync::Mutex;

const ALPHA: f64 = 0.3;
const ERROR_DECAY: f64 = 0.95;
const FAIL_TRIP_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthSnapshot {
    pub avg_latency_ms: f64,
    pub consecutive_fails: u32,
    pub is_healthy: bool,
    pub error_rate: f64,
}

impl Default for HealthSnapshot {
    fn default() -> Self {
        Self {
            avg_latency_ms: 0.0,
            consecutive_fails: 0,
            is_healthy: true,
            error_rate: 0.0,
        }
    }
}

/// One entry per provider (spec §4.E); reads and writes are serialized per-entry via the
/// registry mutex, mirroring the "per-provider mutable entry behind a registry" shape the
/// teacher uses for credential pool state.
pub struct HealthTracker {
    entries: Mutex<HashMap<String, HealthSnapshot>>,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn record_success(&self, provider: &str, observed_latency_ms: f64) {
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(provider.to_string()).or_default();
        entry.avg_latency_ms = ALPHA * observed_latency_ms + (1.0 - ALPHA) * entry.avg_latency_ms;
        entry.consecutive_fails = 0;
        entry.is_healthy = true;
        entry.error_rate *= ERROR_DECAY;
    }

    pub async fn record_failure(&self, provider: &str) {
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(provider.to_string()).or_default();
        entry.consecutive_fails += 1;
        entry.error_rate = entry.error_rate * ERROR_DECAY + (1.0 - ERROR_DECAY);
        if entry.consecutive_fails >= FAIL_TRIP_THRESHOLD {
            entry.is_healthy = false;
        }
    }

    pub async fn snapshot(&self, provider: &str) -> HealthSnapshot {
        self.entries
            .lock()
            .await
            .get(provider)
            .copied()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_provider_defaults_to_healthy() {
        let tracker = HealthTracker::new();
        let snap = tracker.snapshot("openai").await;
        assert!(snap.is_healthy);
        assert_eq!(snap.consecutive_fails, 0);
    }

    #[tokio::test]
    async fn three_consecutive_failures_trip_unhealthy() {
        let tracker = HealthTracker::new();
        tracker.record_failure("openai").await;
        tracker.record_failure("openai").await;
        assert!(tracker.snapshot("openai").await.is_healthy);
        tracker.record_failure("openai").await;
        let snap = tracker.snapshot("openai").await;
        assert!(!snap.is_healthy);
        assert_eq!(snap.consecutive_fails, 3);
    }

    #[tokio::test]
    async fn success_recovers_immediately() {
        let tracker = HealthTracker::new();
        for _ in 0..3 {
            tracker.record_failure("openai").await;
        }
        assert!(!tracker.snapshot("openai").await.is_healthy);
        tracker.record_success("openai", 120.0).await;
        let snap = tracker.snapshot("openai").await;
        assert!(snap.is_healthy);
        assert_eq!(snap.consecutive_fails, 0);
    }

    #[tokio::test]
    async fn avg_latency_is_exponential_moving_average() {
        let tracker = HealthTracker::new();
        tracker.record_success("openai", 100.0).await;
        assert_eq!(tracker.snapshot("openai").await.avg_latency_ms, 30.0);
        tracker.record_success("openai", 100.0).await;
        let snap = tracker.snapshot("openai").await;
        assert!((snap.avg_latency_ms - 51.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn error_rate_decays_on_success_and_climbs_on_failure() {
        let tracker = HealthTracker::new();
        tracker.record_failure("openai").await;
        let after_fail = tracker.snapshot("openai").await.error_rate;
        assert!((after_fail - 0.05).abs() < 1e-9);
        tracker.record_success("openai", 10.0).await;
        let after_success = tracker.snapshot("openai").await.error_rate;
        assert!((after_success - after_fail * 0.95).abs() < 1e-9);
    }
}
