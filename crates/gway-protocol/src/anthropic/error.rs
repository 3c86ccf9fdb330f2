use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct AnthropicErrorBody {
    #[serde(rename = "type")]
    pub kind: String,
    pub error: AnthropicErrorDetail,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnthropicErrorDetail {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

impl AnthropicErrorBody {
    pub fn new(message: impl Into<String>, kind: impl Into<String>) -> Self {
        let kind = kind.into();
        Self {
            kind: "error".to_string(),
            error: AnthropicErrorDetail {
                kind,
                message: message.into(),
            },
        }
    }

    pub fn api_error(message: impl Into<String>) -> Self {
        Self::new(message, "api_error")
    }
}
