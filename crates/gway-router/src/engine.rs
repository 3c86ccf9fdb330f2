use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use gway_common::GatewayError;
use gway_limiter::{BucketKey, HealthTracker, LimitDimension};

use crate::catalog::{PricingCatalog, RateLimitCatalog, WILDCARD_MODEL};
use crate::types::{ProviderOption, RouteDecision, RouteRequest, Strategy};

/// Filters a pricing catalog down to available, healthy candidates and selects one per
/// `Strategy` (spec §4.F).
pub struct RoutingEngine {
    pricing: Arc<dyn PricingCatalog>,
    limiters: Arc<dyn RateLimitCatalog>,
    health: Arc<HealthTracker>,
    round_robin_index: AtomicUsize,
}

impl RoutingEngine {
    pub fn new(
        pricing: Arc<dyn PricingCatalog>,
        limiters: Arc<dyn RateLimitCatalog>,
        health: Arc<HealthTracker>,
    ) -> Self {
        Self {
            pricing,
            limiters,
            health,
            round_robin_index: AtomicUsize::new(0),
        }
    }

    pub async fn route(&self, request: &RouteRequest, strategy: Strategy) -> Result<RouteDecision, GatewayError> {
        let entries = self.pricing.candidates(&request.capability).await;

        let mut candidates: Vec<ProviderOption> = Vec::new();
        for entry in entries {
            // Step 1: at least one nonzero cost field.
            if entry.input_cost_per_million <= 0.0 && entry.output_cost_per_million <= 0.0 {
                continue;
            }
            // Step 3: excluded providers.
            if request.exclude_providers.iter().any(|p| p == &entry.provider) {
                continue;
            }

            // Step 2: split estimate evenly between input and output halves.
            let half = request.estimated_tokens as f64 / 2.0;
            let estimated_cost = half * entry.input_cost_per_million / 1e6
                + half * entry.output_cost_per_million / 1e6;

            // Step 4: limiter availability (missing limiter => available).
            let is_available = match self.limiters.limiter_for(&entry.provider, &entry.plan).await {
                Some(limiter) => {
                    let rpm_key = BucketKey::new(&entry.provider, &entry.plan, LimitDimension::Rpm);
                    let tpm_key = BucketKey::new(&entry.provider, &entry.plan, LimitDimension::Tpm);
                    let rpm_ok = limiter.get_available(&rpm_key).await.is_none_or(|v| v >= 1);
                    let tpm_ok = limiter
                        .get_available(&tpm_key)
                        .await
                        .is_none_or(|v| v >= request.estimated_tokens);
                    rpm_ok && tpm_ok
                }
                None => true,
            };

            // Step 5: health.
            let health = self.health.snapshot(&entry.provider).await;

            // A wildcard catalog entry serves any model; resolve it to the caller's requested
            // model so the candidate (and anything selected from it) never carries the literal
            // "*" into an outbound request or a required-models comparison.
            let model = if entry.model == WILDCARD_MODEL {
                request.required_models.first().cloned().unwrap_or(entry.model)
            } else {
                entry.model
            };

            candidates.push(ProviderOption {
                provider: entry.provider,
                model,
                plan: entry.plan,
                estimated_cost,
                avg_latency_ms: health.avg_latency_ms,
                is_healthy: health.is_healthy,
                is_available,
            });
        }

        // Step 6: cost/latency/model filters. Health is not a hard filter here: `Strategy::Fallback`
        // needs unhealthy candidates still present so it can report "degraded" instead of every
        // candidate having already been dropped out from under it.
        let filtered: Vec<ProviderOption> = candidates
            .into_iter()
            .filter(|c| c.is_available)
            .filter(|c| request.max_cost.is_none_or(|max| c.estimated_cost <= max))
            .filter(|c| request.max_latency_ms.is_none_or(|max| c.avg_latency_ms <= max))
            .filter(|c| request.required_models.is_empty() || request.required_models.contains(&c.model))
            .collect();

        if filtered.is_empty() {
            return Err(GatewayError::NoProvidersMatch);
        }

        let (selected, reason) = self.select(&filtered, strategy);
        let estimated_cost = selected.as_ref().map(|c| c.estimated_cost);

        Ok(RouteDecision {
            selected,
            reason,
            all_filtered_candidates: filtered,
            estimated_cost,
        })
    }

    fn select(&self, candidates: &[ProviderOption], strategy: Strategy) -> (Option<ProviderOption>, String) {
        match strategy {
            Strategy::Cheapest => {
                let picked = candidates
                    .iter()
                    .min_by(|a, b| a.estimated_cost.total_cmp(&b.estimated_cost))
                    .cloned();
                (picked, "cheapest: minimum estimated_cost".to_string())
            }
            Strategy::Fastest => {
                let picked = candidates
                    .iter()
                    .min_by(|a, b| a.avg_latency_ms.total_cmp(&b.avg_latency_ms))
                    .cloned();
                (picked, "fastest: minimum avg_latency_ms".to_string())
            }
            Strategy::Balanced => {
                let max_cost = candidates.iter().map(|c| c.estimated_cost).fold(0.0, f64::max);
                let max_latency = candidates.iter().map(|c| c.avg_latency_ms).fold(0.0, f64::max);
                let picked = candidates
                    .iter()
                    .min_by(|a, b| {
                        balanced_score(a, max_cost, max_latency).total_cmp(&balanced_score(b, max_cost, max_latency))
                    })
                    .cloned();
                (picked, "balanced: 0.6*cost_norm + 0.4*latency_norm".to_string())
            }
            Strategy::RoundRobin => {
                let idx = self.round_robin_index.fetch_add(1, Ordering::SeqCst) % candidates.len();
                (Some(candidates[idx].clone()), format!("round_robin: index {idx}"))
            }
            Strategy::Fallback => match candidates.iter().find(|c| c.is_healthy) {
                Some(healthy) => (Some(healthy.clone()), "fallback: first healthy candidate".to_string()),
                None => (candidates.first().cloned(), "degraded".to_string()),
            },
        }
    }
}

fn balanced_score(candidate: &ProviderOption, max_cost: f64, max_latency: f64) -> f64 {
    let cost_norm = if max_cost > 0.0 { candidate.estimated_cost / max_cost } else { 0.0 };
    let latency_norm = if max_latency > 0.0 { candidate.avg_latency_ms / max_latency } else { 0.0 };
    0.6 * cost_norm + 0.4 * latency_norm
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option(provider: &str, cost: f64, latency: f64, healthy: bool) -> ProviderOption {
        ProviderOption {
            provider: provider.to_string(),
            model: "gpt-test".to_string(),
            plan: "default".to_string(),
            estimated_cost: cost,
            avg_latency_ms: latency,
            is_healthy: healthy,
            is_available: true,
        }
    }

    fn engine() -> RoutingEngine {
        use crate::catalog::{PricingCatalog, PricingEntry, RateLimitCatalog};
        use async_trait::async_trait;

        struct EmptyPricing;
        #[async_trait]
        impl PricingCatalog for EmptyPricing {
            async fn candidates(&self, _capability: &str) -> Vec<PricingEntry> {
                Vec::new()
            }
        }
        struct NoLimits;
        #[async_trait]
        impl RateLimitCatalog for NoLimits {
            async fn limiter_for(&self, _provider: &str, _plan: &str) -> Option<Arc<gway_limiter::TokenBucketLimiter>> {
                None
            }
        }
        RoutingEngine::new(Arc::new(EmptyPricing), Arc::new(NoLimits), Arc::new(HealthTracker::new()))
    }

    #[test]
    fn cheapest_picks_minimum_cost() {
        let engine = engine();
        let candidates = vec![option("a", 3.0, 100.0, true), option("b", 1.0, 200.0, true)];
        let (picked, _) = engine.select(&candidates, Strategy::Cheapest);
        assert_eq!(picked.unwrap().provider, "b");
    }

    #[test]
    fn fastest_picks_minimum_latency() {
        let engine = engine();
        let candidates = vec![option("a", 3.0, 100.0, true), option("b", 1.0, 200.0, true)];
        let (picked, _) = engine.select(&candidates, Strategy::Fastest);
        assert_eq!(picked.unwrap().provider, "a");
    }

    #[test]
    fn balanced_weighs_cost_more_than_latency() {
        let engine = engine();
        // a is much cheaper but a bit slower; with 0.6/0.4 weighting it should still win.
        let candidates = vec![option("a", 1.0, 150.0, true), option("b", 10.0, 100.0, true)];
        let (picked, _) = engine.select(&candidates, Strategy::Balanced);
        assert_eq!(picked.unwrap().provider, "a");
    }

    #[test]
    fn round_robin_cycles_through_candidates() {
        let engine = engine();
        let candidates = vec![option("a", 1.0, 1.0, true), option("b", 1.0, 1.0, true)];
        let (first, _) = engine.select(&candidates, Strategy::RoundRobin);
        let (second, _) = engine.select(&candidates, Strategy::RoundRobin);
        let (third, _) = engine.select(&candidates, Strategy::RoundRobin);
        assert_eq!(first.unwrap().provider, "a");
        assert_eq!(second.unwrap().provider, "b");
        assert_eq!(third.unwrap().provider, "a");
    }

    #[test]
    fn fallback_prefers_healthy_then_reports_degraded() {
        let engine = engine();
        let all_unhealthy = vec![option("a", 1.0, 1.0, false), option("b", 1.0, 1.0, false)];
        let (picked, reason) = engine.select(&all_unhealthy, Strategy::Fallback);
        assert_eq!(picked.unwrap().provider, "a");
        assert_eq!(reason, "degraded");

        let mixed = vec![option("a", 1.0, 1.0, false), option("b", 1.0, 1.0, true)];
        let (picked, reason) = engine.select(&mixed, Strategy::Fallback);
        assert_eq!(picked.unwrap().provider, "b");
        assert_ne!(reason, "degraded");
    }

    #[tokio::test]
    async fn empty_candidate_set_is_no_providers_match() {
        let engine = engine();
        let request = RouteRequest {
            capability: "chat".to_string(),
            estimated_tokens: 100,
            ..Default::default()
        };
        let result = engine.route(&request, Strategy::Cheapest).await;
        assert!(matches!(result, Err(GatewayError::NoProvidersMatch)));
    }
}
