/// Inputs to the routing engine (spec §4.F).
#[derive(Debug, Clone, Default)]
pub struct RouteRequest {
    pub capability: String,
    pub estimated_tokens: u64,
    pub max_cost: Option<f64>,
    pub max_latency_ms: Option<f64>,
    pub required_models: Vec<String>,
    pub exclude_providers: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Cheapest,
    Fastest,
    Balanced,
    RoundRobin,
    Fallback,
}

/// A candidate as it moves through the filter pipeline, accumulating cost, availability, and
/// health before a strategy picks among the survivors.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderOption {
    pub provider: String,
    pub model: String,
    pub plan: String,
    pub estimated_cost: f64,
    pub avg_latency_ms: f64,
    pub is_healthy: bool,
    pub is_available: bool,
}

#[derive(Debug, Clone)]
pub struct RouteDecision {
    pub selected: Option<ProviderOption>,
    pub reason: String,
    pub all_filtered_candidates: Vec<ProviderOption>,
    pub estimated_cost: Option<f64>,
}
