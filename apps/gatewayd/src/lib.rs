pub mod cli;
pub mod config;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use gway_core::{AppState, app_router};
use gway_limiter::HealthTracker;
use gway_router::RoutingEngine;

use crate::cli::GlobalConfig;
use crate::config::{EnvKeyProvider, IdentityRemapper, StaticPricingCatalog, StaticRateLimitCatalog};

/// Builds the shared gateway state from a resolved CLI/env configuration. Split out of `main`
/// so integration tests can stand up the same router the binary serves.
pub fn build_state(global: &GlobalConfig) -> Arc<AppState> {
    let pricing = Arc::new(StaticPricingCatalog::seeded());
    let rate_limits = Arc::new(StaticRateLimitCatalog::seeded());
    let health = Arc::new(HealthTracker::new());
    let routing = Arc::new(RoutingEngine::new(pricing, rate_limits.clone(), health.clone()));

    let mut state = AppState::new(
        routing,
        health,
        Arc::new(EnvKeyProvider),
        Arc::new(IdentityRemapper),
        rate_limits,
    );
    state.rate_limit_deadline = Duration::from_secs(global.rate_limit_deadline_secs);
    state.http_defaults.proxy = global.proxy.clone();
    Arc::new(state)
}

pub fn router(state: Arc<AppState>) -> Router {
    app_router(state)
}
