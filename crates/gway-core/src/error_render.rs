use axum::body::Body;
use axum::http::{HeaderValue, StatusCode};
use axum::response::Response;
use gway_common::GatewayError;
use gway_protocol::anthropic::error::AnthropicErrorBody;
use gway_protocol::openai::error::OpenAiErrorBody;

use crate::protocol_kind::ProtocolKind;

/// Renders a `GatewayError` as a full axum response, shaped in the client's own wire protocol
/// (spec §7: "user-visible failures always match the wire protocol the client used").
pub fn render_error(err: &GatewayError, protocol: ProtocolKind) -> Response {
    let status = err.status();

    if let GatewayError::UpstreamStatus { body, headers, .. } = err {
        let mut response = Response::builder().status(status);
        for (name, value) in headers {
            if gway_common::is_hop_by_hop_or_framing_header(name) {
                continue;
            }
            if let (Ok(name), Ok(value)) = (
                axum::http::HeaderName::try_from(name.as_str()),
                HeaderValue::from_str(value),
            ) {
                response = response.header(name, value);
            }
        }
        return response
            .body(Body::from(body.clone()))
            .unwrap_or_else(|_| Response::new(Body::empty()));
    }

    let kind = error_kind(err, protocol);
    let message = err.message();
    let body = match protocol {
        ProtocolKind::OpenAi => serde_json::to_vec(&OpenAiErrorBody::new(message, kind)),
        ProtocolKind::Anthropic => serde_json::to_vec(&AnthropicErrorBody::new(message, kind)),
    }
    .unwrap_or_else(|_| b"{}".to_vec());

    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

pub fn status_for(err: &GatewayError) -> StatusCode {
    err.status()
}

fn error_kind(err: &GatewayError, protocol: ProtocolKind) -> &'static str {
    match (err, protocol) {
        (GatewayError::InvalidRequest(_), _) => "invalid_request_error",
        (GatewayError::RateLimitExceeded, _) => "rate_limit_error",
        (GatewayError::NoCredential, ProtocolKind::Anthropic) => "authentication_error",
        (GatewayError::NoCredential, ProtocolKind::OpenAi) => "invalid_request_error",
        (GatewayError::NoProvidersMatch, _) => "api_error",
        (GatewayError::UpstreamTransport(_), _) => "api_error",
        (GatewayError::Cancelled, _) => "api_error",
        (GatewayError::ProtocolInvariant(_), _) => "api_error",
        (GatewayError::UpstreamStatus { .. }, _) => "api_error",
    }
}

/// Sanitizes a message for embedding in an SSE `error` event body: quotes become `'`, CR/LF
/// collapse to a space, and the result is capped at 500 characters (spec §4.H SSE writer
/// guarantees).
pub fn sanitize_error_message(message: &str) -> String {
    let collapsed: String = message
        .chars()
        .map(|c| match c {
            '"' => '\'',
            '\r' | '\n' => ' ',
            other => other,
        })
        .collect();
    collapsed.chars().take(500).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_quotes_and_newlines() {
        let sanitized = sanitize_error_message("bad \"value\"\r\nline two");
        assert!(!sanitized.contains('"'));
        assert!(!sanitized.contains('\n'));
        assert!(!sanitized.contains('\r'));
    }

    #[test]
    fn caps_at_500_chars() {
        let long = "x".repeat(2000);
        assert_eq!(sanitize_error_message(&long).chars().count(), 500);
    }

    #[test]
    fn invalid_request_maps_to_invalid_request_error() {
        assert_eq!(
            error_kind(&GatewayError::InvalidRequest("x".to_string()), ProtocolKind::OpenAi),
            "invalid_request_error"
        );
        assert_eq!(
            error_kind(&GatewayError::InvalidRequest("x".to_string()), ProtocolKind::Anthropic),
            "invalid_request_error"
        );
    }
}
