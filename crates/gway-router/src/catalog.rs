use std::sync::Arc;

use async_trait::async_trait;

use gway_limiter::TokenBucketLimiter;

/// Catalog-entry model id meaning "this provider/plan serves any model"; `RoutingEngine::route`
/// resolves it against the caller's requested model before a candidate is returned, so a
/// wildcard entry never leaks the literal `"*"` into an outbound request.
pub const WILDCARD_MODEL: &str = "*";

/// A single provider/model/plan combination as priced by the (external) pricing store.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingEntry {
    pub provider: String,
    pub model: String,
    pub plan: String,
    pub input_cost_per_million: f64,
    pub output_cost_per_million: f64,
}

/// External collaborator (spec.md §1 Non-goals: pricing/catalog storage is out of scope). The
/// router only ever consumes entries through this trait.
#[async_trait]
pub trait PricingCatalog: Send + Sync {
    async fn candidates(&self, capability: &str) -> Vec<PricingEntry>;
}

/// External collaborator supplying the limiter backing a `(provider, plan)` pair, if any is
/// configured. A lookup miss means "not rate-limited" and leaves availability `true`.
#[async_trait]
pub trait RateLimitCatalog: Send + Sync {
    async fn limiter_for(&self, provider: &str, plan: &str) -> Option<Arc<TokenBucketLimiter>>;
}

/// `(model, tenant) -> (model, provider)` remapping, used by `gway-core` to resolve a
/// client-facing model id into a routable `(model, provider)` pair before calling the router.
pub trait Remapper: Send + Sync {
    fn remap(&self, model: &str, tenant: &str) -> (String, String);
}

/// Resolves the outbound credential for a provider, used by `gway-core` when building the
/// upstream request the HTTP engine sends.
pub trait KeyProvider: Send + Sync {
    fn credential_for(&self, provider: &str) -> Option<String>;
}
