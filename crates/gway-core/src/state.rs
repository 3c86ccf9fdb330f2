use std::sync::Arc;
use std::time::Duration;

use gway_http::{EngineConfig, PoolConfig, RetryConfig};
use gway_limiter::HealthTracker;
use gway_router::{KeyProvider, RateLimitCatalog, Remapper, RoutingEngine, Strategy};

/// Shared gateway state (spec §5): one routing engine (itself holding the health registry and
/// round-robin counter), plus the external collaborators the handlers consult per request. The
/// HTTP engine itself is built per-request since its `EngineConfig` (base URL, credential) varies
/// by selected provider; `http_defaults` carries the pool/retry/timeout settings shared by all
/// of them.
pub struct AppState {
    pub routing: Arc<RoutingEngine>,
    pub health: Arc<HealthTracker>,
    pub key_provider: Arc<dyn KeyProvider>,
    pub remapper: Arc<dyn Remapper>,
    pub rate_limits: Arc<dyn RateLimitCatalog>,
    pub http_defaults: HttpDefaults,
    /// Strategy the routing engine reselects with, per spec §2's "F may reselect using D,E,G
    /// metrics" — `Fallback` matches that description most directly: stick with a healthy
    /// candidate, degrade only when every candidate serving the remapped model is unhealthy.
    pub strategy: Strategy,
    /// Deadline for the rate-limit `AcquireAll` before the handler gives up and surfaces
    /// `RateLimitExceeded` (spec §7: "could not satisfy an acquire within the request deadline").
    pub rate_limit_deadline: Duration,
}

#[derive(Debug, Clone)]
pub struct HttpDefaults {
    pub pool: PoolConfig,
    pub retry: RetryConfig,
    pub unary_timeout: Duration,
    pub stream_timeout: Duration,
    pub proxy: Option<String>,
}

impl Default for HttpDefaults {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            retry: RetryConfig::default(),
            unary_timeout: Duration::from_secs(30),
            // Streaming uses a much longer attempt timeout so long-lived SSE responses don't get
            // cut off mid-stream (spec §4.H: "streaming uses a dedicated zero-timeout client").
            stream_timeout: Duration::from_secs(3600),
            proxy: None,
        }
    }
}

impl AppState {
    pub fn new(
        routing: Arc<RoutingEngine>,
        health: Arc<HealthTracker>,
        key_provider: Arc<dyn KeyProvider>,
        remapper: Arc<dyn Remapper>,
        rate_limits: Arc<dyn RateLimitCatalog>,
    ) -> Self {
        Self {
            routing,
            health,
            key_provider,
            remapper,
            rate_limits,
            http_defaults: HttpDefaults::default(),
            strategy: Strategy::Fallback,
            rate_limit_deadline: Duration::from_secs(5),
        }
    }

    pub fn engine_config(&self, base_url: String, credential: Option<String>, want_stream: bool) -> EngineConfig {
        EngineConfig {
            base_url: Some(base_url),
            credential,
            attempt_timeout: if want_stream {
                self.http_defaults.stream_timeout
            } else {
                self.http_defaults.unary_timeout
            },
            pool: self.http_defaults.pool.clone(),
            retry: self.http_defaults.retry.clone(),
            proxy: self.http_defaults.proxy.clone(),
        }
    }
}
