pub mod anthropic;
pub mod canonical;
pub mod openai;
pub mod rate_limit;
pub mod sse;

pub use rate_limit::{RateLimitInfo, parse_rate_limit_headers, parse_retry_after};
pub use sse::{SseChunk, SseStream, read_sse};
