pub mod cancel;
pub mod errors;
pub mod headers;
pub mod sanitize;

pub use cancel::CancelToken;
pub use errors::GatewayError;
pub use headers::{Headers, header_get, header_remove, header_set, is_hop_by_hop_or_framing_header};
pub use sanitize::sanitize_api_key;
