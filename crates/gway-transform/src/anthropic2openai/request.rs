use gway_protocol::anthropic::request::{
    ContentBlock as AnthropicContentBlock, CreateMessageRequest, Message as AnthropicMessage,
    MessageContent, ToolChoice as AnthropicToolChoice,
};
use gway_protocol::openai::request::{
    ChatContent, ChatContentPart, ChatCompletionRequest, ChatMessage, FunctionCall, ImageUrl, Tool,
    ToolCall, ToolChoice as OpenAiToolChoice, ToolChoiceFunction,
};

/// Anthropic create-message request -> OpenAI chat-completions request (§4.G mirror).
pub fn transform_request(request: CreateMessageRequest) -> ChatCompletionRequest {
    let mut messages = Vec::new();

    if let Some(system) = request.system {
        messages.push(ChatMessage {
            role: "system".to_string(),
            content: Some(ChatContent::Text(system)),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        });
    }

    for message in request.messages {
        messages.extend(map_message(message));
    }

    let tools = request.tools.map(|tools| {
        tools
            .into_iter()
            .map(|tool| Tool {
                kind: "function".to_string(),
                function: gway_protocol::openai::request::FunctionDefinition {
                    name: tool.name,
                    description: tool.description,
                    parameters: tool.input_schema,
                },
            })
            .collect()
    });

    ChatCompletionRequest {
        model: request.model,
        messages,
        temperature: request.temperature,
        max_tokens: Some(request.max_tokens),
        max_completion_tokens: None,
        stream: request.stream,
        tools,
        tool_choice: map_tool_choice(request.tool_choice),
    }
}

fn map_message(message: AnthropicMessage) -> Vec<ChatMessage> {
    let blocks = match message.content {
        MessageContent::Text(text) => {
            return vec![ChatMessage {
                role: message.role,
                content: Some(ChatContent::Text(text)),
                tool_calls: None,
                tool_call_id: None,
                name: None,
            }];
        }
        MessageContent::Blocks(blocks) => blocks,
    };

    let tool_results: Vec<&AnthropicContentBlock> = blocks
        .iter()
        .filter(|b| matches!(b, AnthropicContentBlock::ToolResult { .. }))
        .collect();

    if !tool_results.is_empty() {
        let mut out = Vec::new();
        for block in &tool_results {
            if let AnthropicContentBlock::ToolResult {
                tool_use_id,
                content,
            } = block
            {
                out.push(ChatMessage {
                    role: "tool".to_string(),
                    content: Some(ChatContent::Text(content.clone())),
                    tool_calls: None,
                    tool_call_id: Some(tool_use_id.clone()),
                    name: None,
                });
            }
        }

        let text_parts: Vec<String> = blocks
            .iter()
            .filter_map(|b| match b {
                AnthropicContentBlock::Text { text } => Some(text.clone()),
                _ => None,
            })
            .collect();
        if !text_parts.is_empty() {
            out.push(ChatMessage {
                role: message.role,
                content: Some(ChatContent::Text(text_parts.join("\n"))),
                tool_calls: None,
                tool_call_id: None,
                name: None,
            });
        }

        return out;
    }

    if message.role == "assistant" {
        let text_parts: Vec<String> = blocks
            .iter()
            .filter_map(|b| match b {
                AnthropicContentBlock::Text { text } => Some(text.clone()),
                _ => None,
            })
            .collect();
        let content = if text_parts.is_empty() {
            None
        } else {
            Some(ChatContent::Text(text_parts.join("\n")))
        };

        let tool_calls: Vec<ToolCall> = blocks
            .iter()
            .filter_map(|b| match b {
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

        return vec![ChatMessage {
            role: "assistant".to_string(),
            content,
            tool_calls: if tool_calls.is_empty() {
                None
            } else {
                Some(tool_calls)
            },
            tool_call_id: None,
            name: None,
        }];
    }

    let mut parts = Vec::new();
    for block in blocks {
        match block {
            AnthropicContentBlock::Text { text } => parts.push(ChatContentPart::Text { text }),
            AnthropicContentBlock::Image { source } => {
                parts.push(ChatContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:{};base64,{}", source.media_type, source.data),
                    },
                });
            }
            _ => {}
        }
    }

    if parts.is_empty() {
        return Vec::new();
    }

    vec![ChatMessage {
        role: message.role,
        content: Some(ChatContent::Parts(parts)),
        tool_calls: None,
        tool_call_id: None,
        name: None,
    }]
}

fn map_tool_choice(choice: Option<AnthropicToolChoice>) -> Option<OpenAiToolChoice> {
    match choice? {
        AnthropicToolChoice::Auto => Some(OpenAiToolChoice::Mode("auto".to_string())),
        AnthropicToolChoice::Any => Some(OpenAiToolChoice::Mode("required".to_string())),
        AnthropicToolChoice::Tool { name } => {
            Some(OpenAiToolChoice::Function {
                function: ToolChoiceFunction { name },
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gway_protocol::anthropic::request::ImageSource;

    fn req(messages: Vec<AnthropicMessage>) -> CreateMessageRequest {
        CreateMessageRequest {
            model: "claude".to_string(),
            messages,
            max_tokens: 256,
            system: None,
            temperature: None,
            stream: None,
            tools: None,
            tool_choice: None,
        }
    }

    #[test]
    fn system_field_becomes_prepended_system_message() {
        let mut request = req(vec![]);
        request.system = Some("be nice".to_string());
        let out = transform_request(request);
        assert_eq!(out.messages[0].role, "system");
    }

    #[test]
    fn tool_result_splits_into_tool_message_and_user_text() {
        let message = AnthropicMessage {
            role: "user".to_string(),
            content: MessageContent::Blocks(vec![
                AnthropicContentBlock::ToolResult {
                    tool_use_id: "call-1".to_string(),
                    content: "42".to_string(),
                },
                AnthropicContentBlock::Text {
                    text: "thanks".to_string(),
                },
            ]),
        };
        let out = transform_request(req(vec![message]));
        assert_eq!(out.messages.len(), 2);
        assert_eq!(out.messages[0].role, "tool");
        assert_eq!(out.messages[0].tool_call_id.as_deref(), Some("call-1"));
        assert_eq!(out.messages[1].role, "user");
    }

    #[test]
    fn assistant_collects_text_and_tool_use() {
        let message = AnthropicMessage {
            role: "assistant".to_string(),
            content: MessageContent::Blocks(vec![
                AnthropicContentBlock::Text {
                    text: "ok".to_string(),
                },
                AnthropicContentBlock::ToolUse {
                    id: "call-2".to_string(),
                    name: "get_weather".to_string(),
                    input: serde_json::json!({"city": "nyc"}),
                },
            ]),
        };
        let out = transform_request(req(vec![message]));
        assert_eq!(out.messages.len(), 1);
        let tool_calls = out.messages[0].tool_calls.as_ref().unwrap();
        assert_eq!(tool_calls[0].function.name, "get_weather");
        assert!(tool_calls[0].function.arguments.contains("nyc"));
    }

    #[test]
    fn image_block_becomes_data_url() {
        let message = AnthropicMessage {
            role: "user".to_string(),
            content: MessageContent::Blocks(vec![AnthropicContentBlock::Image {
                source: ImageSource {
                    kind: "base64".to_string(),
                    media_type: "image/png".to_string(),
                    data: "abc123".to_string(),
                },
            }]),
        };
        let out = transform_request(req(vec![message]));
        match &out.messages[0].content {
            Some(ChatContent::Parts(parts)) => match &parts[0] {
                ChatContentPart::ImageUrl { image_url } => {
                    assert_eq!(image_url.url, "data:image/png;base64,abc123");
                }
                other => panic!("unexpected part: {other:?}"),
            },
            other => panic!("unexpected content: {other:?}"),
        }
    }
}
