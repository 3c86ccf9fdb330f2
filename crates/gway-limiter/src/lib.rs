pub mod bucket;
pub mod estimate;
pub mod health;

pub use bucket::{BucketKey, LimitDimension, RateLimit, TokenBucketLimiter};
pub use estimate::estimate_tokens;
pub use health::{HealthSnapshot, HealthTracker};
