use gway_protocol::anthropic::request::{
    ContentBlock as AnthropicContentBlock, CreateMessageRequest, ImageSource, Message as AnthropicMessage,
    MessageContent, ToolChoice as AnthropicToolChoice, ToolDefinition as AnthropicToolDefinition,
};
use gway_protocol::openai::request::{
    ChatCompletionRequest, ChatContent, ChatContentPart, ChatMessage, ToolChoice as OpenAiToolChoice,
};
use serde_json::Value;

/// OpenAI chat-completions request -> Anthropic create-message request (§4.G).
pub fn transform_request(request: ChatCompletionRequest) -> CreateMessageRequest {
    let max_tokens = request.effective_max_tokens();

    let mut system_texts = Vec::new();
    let mut messages = Vec::new();

    for message in request.messages {
        if message.role == "system" {
            if let Some(text) = plain_text(&message.content) {
                system_texts.push(text);
            }
            continue;
        }
        messages.extend(map_message(message));
    }

    let system = if system_texts.is_empty() {
        None
    } else {
        Some(system_texts.join("\n\n"))
    };

    let tools = request.tools.map(|tools| {
        tools
            .into_iter()
            .map(|tool| AnthropicToolDefinition {
                name: tool.function.name,
                description: tool.function.description,
                input_schema: tool.function.parameters,
            })
            .collect()
    });

    CreateMessageRequest {
        model: request.model,
        messages,
        max_tokens,
        system,
        temperature: request.temperature,
        stream: request.stream,
        tools,
        tool_choice: map_tool_choice(request.tool_choice),
    }
}

fn map_message(message: ChatMessage) -> Vec<AnthropicMessage> {
    if message.role == "tool" {
        let Some(tool_use_id) = message.tool_call_id else {
            return Vec::new();
        };
        let content = plain_text(&message.content).unwrap_or_default();
        return vec![AnthropicMessage {
            role: "user".to_string(),
            content: MessageContent::Blocks(vec![AnthropicContentBlock::ToolResult {
                tool_use_id,
                content,
            }]),
        }];
    }

    let mut blocks = Vec::new();
    match message.content {
        Some(ChatContent::Text(text)) => {
            if !text.is_empty() {
                blocks.push(AnthropicContentBlock::Text { text });
            }
        }
        Some(ChatContent::Parts(parts)) => {
            for part in parts {
                match part {
                    ChatContentPart::Text { text } => {
                        if !text.is_empty() {
                            blocks.push(AnthropicContentBlock::Text { text });
                        }
                    }
                    ChatContentPart::ImageUrl { image_url } => {
                        if let Some((media_type, data)) = parse_data_url(&image_url.url) {
                            blocks.push(AnthropicContentBlock::Image {
                                source: ImageSource {
                                    kind: "base64".to_string(),
                                    media_type,
                                    data,
                                },
                            });
                        }
                        // Non-data-URI images have no Anthropic base64 equivalent; dropped.
                    }
                }
            }
        }
        None => {}
    }

    if let Some(tool_calls) = message.tool_calls {
        for call in tool_calls {
            let input = serde_json::from_str::<Value>(&call.function.arguments)
                .unwrap_or(Value::Null);
            blocks.push(AnthropicContentBlock::ToolUse {
                id: call.id,
                name: call.function.name,
                input,
            });
        }
    }

    if blocks.is_empty() {
        return Vec::new();
    }

    vec![AnthropicMessage {
        role: message.role,
        content: MessageContent::Blocks(blocks),
    }]
}

fn plain_text(content: &Option<ChatContent>) -> Option<String> {
    match content {
        Some(ChatContent::Text(text)) => Some(text.clone()),
        Some(ChatContent::Parts(parts)) => {
            let texts: Vec<&str> = parts
                .iter()
                .filter_map(|part| match part {
                    ChatContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect();
            if texts.is_empty() {
                None
            } else {
                Some(texts.join("\n"))
            }
        }
        None => None,
    }
}

fn map_tool_choice(choice: Option<OpenAiToolChoice>) -> Option<AnthropicToolChoice> {
    match choice? {
        OpenAiToolChoice::Mode(mode) => match mode.as_str() {
            "auto" => Some(AnthropicToolChoice::Auto),
            "required" => Some(AnthropicToolChoice::Any),
            "none" => None,
            _ => None,
        },
        OpenAiToolChoice::Function { function } => Some(AnthropicToolChoice::Tool { name: function.name }),
    }
}

fn parse_data_url(url: &str) -> Option<(String, String)> {
    let url = url.strip_prefix("data:")?;
    let (meta, data) = url.split_once(',')?;
    let (mime, encoding) = meta.split_once(';')?;
    if encoding != "base64" {
        return None;
    }
    Some((mime.to_string(), data.to_string()))
}
