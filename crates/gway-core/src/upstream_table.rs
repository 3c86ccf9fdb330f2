use crate::protocol_kind::ProtocolKind;

/// A provider's base URL and the wire style its upstream actually speaks (spec §4.H "Upstream
/// URL selection"). Unknown provider names fall back to the native upstream of the client's own
/// protocol, untranslated.
#[derive(Debug, Clone, Copy)]
struct ProviderEntry {
    name: &'static str,
    base_url: &'static str,
    style: ProtocolKind,
}

const TABLE: &[ProviderEntry] = &[
    ProviderEntry { name: "openai", base_url: "https://api.openai.com", style: ProtocolKind::OpenAi },
    ProviderEntry { name: "groq", base_url: "https://api.groq.com/openai", style: ProtocolKind::OpenAi },
    ProviderEntry { name: "together", base_url: "https://api.together.xyz", style: ProtocolKind::OpenAi },
    ProviderEntry { name: "fireworks", base_url: "https://api.fireworks.ai/inference", style: ProtocolKind::OpenAi },
    ProviderEntry { name: "deepseek", base_url: "https://api.deepseek.com", style: ProtocolKind::OpenAi },
    ProviderEntry { name: "deepinfra", base_url: "https://api.deepinfra.com/v1/openai", style: ProtocolKind::OpenAi },
    ProviderEntry { name: "openrouter", base_url: "https://openrouter.ai/api", style: ProtocolKind::OpenAi },
    ProviderEntry { name: "xai", base_url: "https://api.x.ai", style: ProtocolKind::OpenAi },
    ProviderEntry { name: "perplexity", base_url: "https://api.perplexity.ai", style: ProtocolKind::OpenAi },
    ProviderEntry { name: "anthropic", base_url: "https://api.anthropic.com", style: ProtocolKind::Anthropic },
];

fn native_base_url(style: ProtocolKind) -> &'static str {
    match style {
        ProtocolKind::OpenAi => "https://api.openai.com",
        ProtocolKind::Anthropic => "https://api.anthropic.com",
    }
}

/// Resolves a provider name to its base URL and upstream wire style. `client_protocol` is used
/// as the fallback style when the provider name isn't recognized.
pub fn lookup(provider: &str, client_protocol: ProtocolKind) -> (String, ProtocolKind) {
    let key = provider.to_ascii_lowercase();
    match TABLE.iter().find(|entry| entry.name == key) {
        Some(entry) => (entry.base_url.to_string(), entry.style),
        None => (native_base_url(client_protocol).to_string(), client_protocol),
    }
}

/// Builds the auth headers for an outbound request against a provider speaking `style`
/// (Bearer for OpenAI-style, `x-api-key` + `anthropic-version` for Anthropic-style).
pub fn auth_headers(style: ProtocolKind, credential: &str) -> Vec<(String, String)> {
    match style {
        ProtocolKind::OpenAi => vec![("Authorization".to_string(), format!("Bearer {credential}"))],
        ProtocolKind::Anthropic => vec![
            ("x-api-key".to_string(), credential.to_string()),
            ("anthropic-version".to_string(), "2023-06-01".to_string()),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_provider_resolves_its_own_style() {
        let (url, style) = lookup("anthropic", ProtocolKind::OpenAi);
        assert_eq!(url, "https://api.anthropic.com");
        assert_eq!(style, ProtocolKind::Anthropic);
    }

    #[test]
    fn known_openai_style_provider_resolves() {
        let (url, style) = lookup("groq", ProtocolKind::Anthropic);
        assert!(url.contains("groq"));
        assert_eq!(style, ProtocolKind::OpenAi);
    }

    #[test]
    fn unknown_provider_falls_back_to_client_protocol_native_upstream() {
        let (url, style) = lookup("some-unlisted-provider", ProtocolKind::Anthropic);
        assert_eq!(url, "https://api.anthropic.com");
        assert_eq!(style, ProtocolKind::Anthropic);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let (_, style) = lookup("OpenAI", ProtocolKind::Anthropic);
        assert_eq!(style, ProtocolKind::OpenAi);
    }

    #[test]
    fn anthropic_style_uses_x_api_key_and_version_header() {
        let headers = auth_headers(ProtocolKind::Anthropic, "sk-ant-test");
        assert!(headers.iter().any(|(k, v)| k == "x-api-key" && v == "sk-ant-test"));
        assert!(headers.iter().any(|(k, _)| k == "anthropic-version"));
    }

    #[test]
    fn openai_style_uses_bearer_header() {
        let headers = auth_headers(ProtocolKind::OpenAi, "sk-test");
        assert_eq!(headers, vec![("Authorization".to_string(), "Bearer sk-test".to_string())]);
    }
}
