use gway_protocol::anthropic::response::{CreateMessageResponse, Usage as AnthropicUsage};
use gway_protocol::anthropic::request::ContentBlock as AnthropicContentBlock;
use gway_protocol::openai::response::ChatCompletionResponse;
use serde_json::Value;

use crate::stop_reason::openai_to_anthropic;

/// OpenAI chat-completion response -> Anthropic create-message response (§4.G mirror).
pub fn transform_response(response: ChatCompletionResponse) -> CreateMessageResponse {
    let choice = response.choices.into_iter().next();
    let mut content = Vec::new();

    if let Some(choice) = &choice {
        if let Some(text) = &choice.message.content {
            if let Some(text) = text.plain_text_or_self() {
                if !text.is_empty() {
                    content.push(AnthropicContentBlock::Text { text });
                }
            }
        }
        if let Some(tool_calls) = &choice.message.tool_calls {
            for call in tool_calls {
                let input = serde_json::from_str::<Value>(&call.function.arguments)
                    .unwrap_or(Value::Null);
                content.push(AnthropicContentBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.function.name.clone(),
                    input,
                });
            }
        }
    }

    let stop_reason = choice
        .as_ref()
        .and_then(|c| c.finish_reason.as_deref())
        .map(openai_to_anthropic)
        .unwrap_or("end_turn")
        .to_string();

    let usage = response
        .usage
        .map(|u| AnthropicUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        })
        .unwrap_or(AnthropicUsage {
            input_tokens: 0,
            output_tokens: 0,
        });

    CreateMessageResponse {
        id: response.id,
        kind: "message".to_string(),
        role: "assistant".to_string(),
        model: response.model,
        content,
        stop_reason: Some(stop_reason),
        stop_sequence: None,
        usage,
    }
}

trait PlainTextOrSelf {
    fn plain_text_or_self(&self) -> Option<String>;
}

impl PlainTextOrSelf for gway_protocol::openai::request::ChatContent {
    fn plain_text_or_self(&self) -> Option<String> {
        match self {
            gway_protocol::openai::request::ChatContent::Text(text) => Some(text.clone()),
            gway_protocol::openai::request::ChatContent::Parts(parts) => {
                let texts: Vec<&str> = parts
                    .iter()
                    .filter_map(|part| match part {
                        gway_protocol::openai::request::ChatContentPart::Text { text } => {
                            Some(text.as_str())
                        }
                        _ => None,
                    })
                    .collect();
                if texts.is_empty() {
                    None
                } else {
                    Some(texts.join("\n"))
                }
            }
        }
    }
}
