use gway_protocol::anthropic::request::ContentBlock as AnthropicContentBlock;
use gway_protocol::anthropic::response::CreateMessageResponse;
use gway_protocol::openai::request::{ChatContent, ChatMessage, FunctionCall, ToolCall};
use gway_protocol::openai::response::{ChatCompletionResponse, Choice, Usage as OpenAiUsage};

use crate::stop_reason::anthropic_to_openai;

/// Anthropic create-message response -> OpenAI chat-completion response (§4.G mirror).
pub fn transform_response(response: CreateMessageResponse) -> ChatCompletionResponse {
    let text_parts: Vec<String> = response
        .content
        .iter()
        .filter_map(|block| match block {
            AnthropicContentBlock::Text { text } => Some(text.clone()),
            _ => None,
        })
        .collect();
    let content = if text_parts.is_empty() {
        None
    } else {
        Some(ChatContent::Text(text_parts.join("\n")))
    };

    let tool_calls: Vec<ToolCall> = response
        .content
        .iter()
        .filter_map(|block| match block {
            AnthropicContentBlock::ToolUse { id, name, input } => Some(ToolCall {
                id: id.clone(),
                kind: "function".to_string(),
                function: FunctionCall {
                    name: name.clone(),
                    arguments: serde_json::to_string(input).unwrap_or_else(|_| "{}".to_string()),
                },
            }),
            _ => None,
        })
        .collect();

    let finish_reason = response
        .stop_reason
        .as_deref()
        .map(anthropic_to_openai)
        .unwrap_or("stop")
        .to_string();

    ChatCompletionResponse {
        id: response.id,
        object: "chat.completion".to_string(),
        model: response.model,
        choices: vec![Choice {
            index: 0,
            message: ChatMessage {
                role: "assistant".to_string(),
                content,
                tool_calls: if tool_calls.is_empty() {
                    None
                } else {
                    Some(tool_calls)
                },
                tool_call_id: None,
                name: None,
            },
            finish_reason: Some(finish_reason),
        }],
        usage: Some(OpenAiUsage {
            prompt_tokens: response.usage.input_tokens,
            completion_tokens: response.usage.output_tokens,
            total_tokens: response.usage.input_tokens + response.usage.output_tokens,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gway_protocol::anthropic::response::Usage as AnthropicUsage;

    #[test]
    fn maps_text_tool_use_and_usage() {
        let response = CreateMessageResponse {
            id: "msg-1".to_string(),
            kind: "message".to_string(),
            role: "assistant".to_string(),
            model: "claude-3".to_string(),
            content: vec![
                AnthropicContentBlock::Text {
                    text: "hi".to_string(),
                },
                AnthropicContentBlock::ToolUse {
                    id: "call-1".to_string(),
                    name: "lookup".to_string(),
                    input: serde_json::json!({"q": "x"}),
                },
            ],
            stop_reason: Some("tool_use".to_string()),
            stop_sequence: None,
            usage: AnthropicUsage {
                input_tokens: 4,
                output_tokens: 6,
            },
        };
        let out = transform_response(response);
        assert_eq!(out.choices[0].finish_reason.as_deref(), Some("tool_calls"));
        assert_eq!(out.usage.unwrap().total_tokens, 10);
        assert!(out.choices[0].message.tool_calls.is_some());
    }
}
