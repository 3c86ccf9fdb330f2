pub mod catalog;
pub mod engine;
pub mod types;

pub use catalog::{KeyProvider, PricingCatalog, PricingEntry, RateLimitCatalog, Remapper, WILDCARD_MODEL};
pub use engine::RoutingEngine;
pub use types::{ProviderOption, RouteDecision, RouteRequest, Strategy};
