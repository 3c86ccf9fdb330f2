use http::StatusCode;
use thiserror::Error;

/// Error taxonomy shared across the gateway (spec §7). Each variant maps to a
/// fixed client-visible status; the wire-protocol shape (OpenAI vs Anthropic)
/// is rendered by the caller, which knows which protocol the client used.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("no credential available for provider")]
    NoCredential,

    #[error("no providers match the routing request")]
    NoProvidersMatch,

    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error("upstream transport error: {0}")]
    UpstreamTransport(String),

    #[error("upstream returned status {status}")]
    UpstreamStatus {
        status: u16,
        body: bytes::Bytes,
        headers: Vec<(String, String)>,
    },

    #[error("request cancelled")]
    Cancelled,

    #[error("protocol invariant violated: {0}")]
    ProtocolInvariant(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::NoCredential => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::NoProvidersMatch => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::UpstreamTransport(_) => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamStatus { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            GatewayError::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
            GatewayError::ProtocolInvariant(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> String {
        match self {
            GatewayError::UpstreamStatus { body, .. } => String::from_utf8_lossy(body).to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_taxonomy() {
        assert_eq!(
            GatewayError::InvalidRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(GatewayError::NoCredential.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            GatewayError::RateLimitExceeded.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            GatewayError::ProtocolInvariant("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
