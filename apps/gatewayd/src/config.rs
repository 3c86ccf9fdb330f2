use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gway_limiter::{LimitDimension, RateLimit, TokenBucketLimiter};
use gway_router::{KeyProvider, PricingCatalog, PricingEntry, RateLimitCatalog, Remapper, WILDCARD_MODEL};

/// Providers this build knows how to price and rate-limit out of the box. Credentials are read
/// from `<PROVIDER>_API_KEY` (uppercased), e.g. `OPENAI_API_KEY`, `ANTHROPIC_API_KEY`.
const KNOWN_PROVIDERS: &[&str] = &[
    "openai", "anthropic", "groq", "together", "fireworks", "deepseek", "deepinfra", "openrouter", "xai",
    "perplexity",
];

/// Reads provider credentials from the process environment. A missing variable means
/// `credential_for` returns `None`, which the handler surfaces as a 503 `NoCredential`.
pub(crate) struct EnvKeyProvider;

impl KeyProvider for EnvKeyProvider {
    fn credential_for(&self, provider: &str) -> Option<String> {
        let var = format!("{}_API_KEY", provider.to_ascii_uppercase());
        env::var(var).ok().filter(|v| !v.is_empty())
    }
}

/// Identity remapper: every tenant sees the model and provider it asked for, with the provider
/// inferred as the model's own vendor prefix falling back to `openai`. A deployment that wants
/// per-tenant policy swaps this implementation out; the CLI/env surface carries no such policy
/// since durable config storage is out of scope.
pub(crate) struct IdentityRemapper;

impl Remapper for IdentityRemapper {
    fn remap(&self, model: &str, _tenant: &str) -> (String, String) {
        let provider = infer_provider(model);
        (model.to_string(), provider)
    }
}

fn infer_provider(model: &str) -> String {
    let lower = model.to_ascii_lowercase();
    if lower.starts_with("claude") {
        "anthropic".to_string()
    } else if lower.starts_with("grok") {
        "xai".to_string()
    } else if lower.starts_with("deepseek") {
        "deepseek".to_string()
    } else {
        "openai".to_string()
    }
}

/// Flat in-memory pricing table seeded with one `WILDCARD_MODEL` entry per known provider's
/// `default` plan, so every model requested against a known provider routes successfully. Real
/// per-model pricing is a deployment-time concern this core gateway doesn't store (spec.md
/// Non-goals); the flat rate keeps routing's cost comparisons meaningful without a backing
/// store.
pub(crate) struct StaticPricingCatalog {
    entries: Vec<PricingEntry>,
}

impl StaticPricingCatalog {
    pub(crate) fn seeded() -> Self {
        let entries = KNOWN_PROVIDERS
            .iter()
            .map(|&provider| PricingEntry {
                provider: provider.to_string(),
                model: WILDCARD_MODEL.to_string(),
                plan: "default".to_string(),
                input_cost_per_million: 1.0,
                output_cost_per_million: 2.0,
            })
            .collect();
        Self { entries }
    }
}

#[async_trait]
impl PricingCatalog for StaticPricingCatalog {
    async fn candidates(&self, _capability: &str) -> Vec<PricingEntry> {
        self.entries.clone()
    }
}

/// One `TokenBucketLimiter` per known provider's `default` plan, RPM=500/TPM=200000 per minute
/// (spec.md §8 scenario 6's own RPM=500 example).
pub(crate) struct StaticRateLimitCatalog {
    limiters: HashMap<String, Arc<TokenBucketLimiter>>,
}

impl StaticRateLimitCatalog {
    pub(crate) fn seeded() -> Self {
        let limiters = KNOWN_PROVIDERS
            .iter()
            .map(|&provider| {
                let records = vec![
                    RateLimit {
                        provider: provider.to_string(),
                        plan: "default".to_string(),
                        dimension: LimitDimension::Rpm,
                        capacity: 500,
                        refill_rate: 500,
                        refill_interval: Duration::from_secs(60),
                    },
                    RateLimit {
                        provider: provider.to_string(),
                        plan: "default".to_string(),
                        dimension: LimitDimension::Tpm,
                        capacity: 200_000,
                        refill_rate: 200_000,
                        refill_interval: Duration::from_secs(60),
                    },
                ];
                (provider.to_string(), Arc::new(TokenBucketLimiter::new(records)))
            })
            .collect();
        Self { limiters }
    }
}

#[async_trait]
impl RateLimitCatalog for StaticRateLimitCatalog {
    async fn limiter_for(&self, provider: &str, plan: &str) -> Option<Arc<TokenBucketLimiter>> {
        if plan != "default" {
            return None;
        }
        self.limiters.get(provider).cloned()
    }
}
