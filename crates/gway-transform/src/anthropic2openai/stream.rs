use std::collections::BTreeMap;

use gway_protocol::anthropic::stream::{ContentBlockDelta, ContentBlockStart, StreamEvent};
use gway_protocol::openai::response::{
    ChatCompletionChunk, ChoiceDelta, ChunkChoice, FunctionCallDelta, ToolCallDelta, Usage as OpenAiUsage,
};

use crate::stop_reason::anthropic_to_openai;

#[derive(Debug, Clone)]
struct ToolCallInfo {
    id: String,
    name: String,
}

/// Translates a sequence of Anthropic message-stream events into the
/// equivalent OpenAI chat-completion-chunk objects (§4.G streaming mirror).
#[derive(Debug, Clone)]
pub struct AnthropicToOpenAiStreamState {
    id: String,
    model: String,
    tool_calls: BTreeMap<u32, ToolCallInfo>,
}

impl AnthropicToOpenAiStreamState {
    pub fn new() -> Self {
        Self {
            id: "unknown".to_string(),
            model: "unknown".to_string(),
            tool_calls: BTreeMap::new(),
        }
    }

    pub fn transform_event(&mut self, event: StreamEvent) -> Vec<ChatCompletionChunk> {
        match event {
            StreamEvent::MessageStart { message } => {
                self.id = message.id;
                self.model = message.model;
                vec![self.chunk(
                    ChoiceDelta {
                        role: Some("assistant".to_string()),
                        content: None,
                        tool_calls: None,
                    },
                    None,
                    None,
                )]
            }
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                ContentBlockStart::Text { text } => self.text_chunk(&text),
                ContentBlockStart::ToolUse { id, name, .. } => {
                    self.tool_calls.insert(
                        index,
                        ToolCallInfo {
                            id: id.clone(),
                            name: name.clone(),
                        },
                    );
                    vec![self.chunk(
                        ChoiceDelta {
                            role: None,
                            content: None,
                            tool_calls: Some(vec![ToolCallDelta {
                                index,
                                id: Some(id),
                                function: Some(FunctionCallDelta {
                                    name: Some(name),
                                    arguments: None,
                                }),
                            }]),
                        },
                        None,
                        None,
                    )]
                }
            },
            StreamEvent::ContentBlockDelta { index, delta } => match delta {
                ContentBlockDelta::TextDelta { text } => self.text_chunk(&text),
                ContentBlockDelta::InputJsonDelta { partial_json } => {
                    if partial_json.is_empty() {
                        Vec::new()
                    } else {
                        vec![self.chunk(
                            ChoiceDelta {
                                role: None,
                                content: None,
                                tool_calls: Some(vec![ToolCallDelta {
                                    index,
                                    id: None,
                                    function: Some(FunctionCallDelta {
                                        name: None,
                                        arguments: Some(partial_json),
                                    }),
                                }]),
                            },
                            None,
                            None,
                        )]
                    }
                }
            },
            StreamEvent::ContentBlockStop { .. } => Vec::new(),
            StreamEvent::MessageDelta { delta, usage } => {
                let finish_reason = delta.stop_reason.as_deref().map(anthropic_to_openai);
                let usage = usage.map(|u| OpenAiUsage {
                    prompt_tokens: u.input_tokens,
                    completion_tokens: u.output_tokens,
                    total_tokens: u.input_tokens + u.output_tokens,
                });
                if finish_reason.is_none() && usage.is_none() {
                    Vec::new()
                } else {
                    vec![self.chunk(
                        ChoiceDelta {
                            role: None,
                            content: None,
                            tool_calls: None,
                        },
                        finish_reason.map(|s| s.to_string()),
                        usage,
                    )]
                }
            }
            StreamEvent::MessageStop => Vec::new(),
        }
    }

    fn text_chunk(&self, text: &str) -> Vec<ChatCompletionChunk> {
        if text.is_empty() {
            return Vec::new();
        }
        vec![self.chunk(
            ChoiceDelta {
                role: None,
                content: Some(text.to_string()),
                tool_calls: None,
            },
            None,
            None,
        )]
    }

    fn chunk(
        &self,
        delta: ChoiceDelta,
        finish_reason: Option<String>,
        usage: Option<OpenAiUsage>,
    ) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
            usage,
        }
    }
}

impl Default for AnthropicToOpenAiStreamState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gway_protocol::anthropic::stream::{MessageDeltaFields, MessageStartPayload};
    use gway_protocol::anthropic::response::Usage as AnthropicUsage;

    #[test]
    fn message_start_emits_role_chunk() {
        let mut state = AnthropicToOpenAiStreamState::new();
        let chunks = state.transform_event(StreamEvent::MessageStart {
            message: MessageStartPayload {
                id: "msg-1".to_string(),
                kind: "message".to_string(),
                role: "assistant".to_string(),
                model: "claude-3".to_string(),
            },
        });
        assert_eq!(chunks[0].choices[0].delta.role.as_deref(), Some("assistant"));
    }

    #[test]
    fn text_delta_becomes_content_chunk() {
        let mut state = AnthropicToOpenAiStreamState::new();
        let chunks = state.transform_event(StreamEvent::ContentBlockDelta {
            index: 0,
            delta: ContentBlockDelta::TextDelta {
                text: "hi".to_string(),
            },
        });
        assert_eq!(chunks[0].choices[0].delta.content.as_deref(), Some("hi"));
    }

    #[test]
    fn message_delta_with_stop_reason_maps_finish_reason() {
        let mut state = AnthropicToOpenAiStreamState::new();
        let chunks = state.transform_event(StreamEvent::MessageDelta {
            delta: MessageDeltaFields {
                stop_reason: Some("tool_use".to_string()),
                stop_sequence: None,
            },
            usage: Some(AnthropicUsage {
                input_tokens: 3,
                output_tokens: 7,
            }),
        });
        assert_eq!(
            chunks[0].choices[0].finish_reason.as_deref(),
            Some("tool_calls")
        );
        assert_eq!(chunks[0].usage.as_ref().unwrap().total_tokens, 10);
    }

    #[test]
    fn message_delta_with_neither_field_emits_nothing() {
        let mut state = AnthropicToOpenAiStreamState::new();
        let chunks = state.transform_event(StreamEvent::MessageDelta {
            delta: MessageDeltaFields::default(),
            usage: None,
        });
        assert!(chunks.is_empty());
    }
}
