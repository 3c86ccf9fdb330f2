use std::collections::BTreeMap;

use gway_protocol::anthropic::stream::{
    ContentBlockDelta, ContentBlockStart, MessageDeltaFields, MessageStartPayload, StreamEvent,
};
use gway_protocol::anthropic::response::Usage as AnthropicUsage;
use gway_protocol::openai::response::{ChatCompletionChunk, Usage as OpenAiUsage};

use crate::stop_reason::openai_to_anthropic;

#[derive(Debug, Clone)]
struct ToolBlockInfo {
    block_index: u32,
}

/// Translates a sequence of OpenAI chat-completion-chunk objects into the
/// equivalent Anthropic message-stream events (§4.G streaming direction).
#[derive(Debug, Clone)]
pub struct OpenAiToAnthropicStreamState {
    id: String,
    model: String,
    message_started: bool,
    finish_emitted: bool,
    next_block_index: u32,
    text_block_index: Option<u32>,
    tool_blocks: BTreeMap<u32, ToolBlockInfo>,
}

impl Default for OpenAiToAnthropicStreamState {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenAiToAnthropicStreamState {
    pub fn new() -> Self {
        Self {
            id: "unknown".to_string(),
            model: "unknown".to_string(),
            message_started: false,
            finish_emitted: false,
            next_block_index: 0,
            text_block_index: None,
            tool_blocks: BTreeMap::new(),
        }
    }

    pub fn transform_chunk(&mut self, chunk: ChatCompletionChunk) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        let choice = chunk.choices.first();

        if !self.message_started
            && choice.is_some_and(|c| c.delta.role.as_deref() == Some("assistant"))
        {
            self.id = chunk.id.clone();
            self.model = chunk.model.clone();
            self.message_started = true;
            events.push(StreamEvent::MessageStart {
                message: MessageStartPayload {
                    id: self.id.clone(),
                    kind: "message".to_string(),
                    role: "assistant".to_string(),
                    model: self.model.clone(),
                },
            });
        }

        if let Some(choice) = choice {
            if let Some(text) = &choice.delta.content {
                events.extend(self.emit_text(text));
            }
            if let Some(tool_calls) = &choice.delta.tool_calls {
                for call in tool_calls {
                    events.extend(self.emit_tool_call(call));
                }
            }
        }

        let usage = chunk.usage.map(map_usage);
        let finish_reason = choice.and_then(|c| c.finish_reason.as_deref());

        if let Some(reason) = finish_reason {
            if !self.finish_emitted {
                events.extend(self.close_open_blocks());
                events.push(StreamEvent::MessageDelta {
                    delta: MessageDeltaFields {
                        stop_reason: Some(openai_to_anthropic(reason).to_string()),
                        stop_sequence: None,
                    },
                    usage,
                });
                events.push(StreamEvent::MessageStop);
                self.finish_emitted = true;
            }
        } else if let Some(usage) = usage {
            events.push(StreamEvent::MessageDelta {
                delta: MessageDeltaFields::default(),
                usage: Some(usage),
            });
        }

        events
    }

    fn emit_text(&mut self, text: &str) -> Vec<StreamEvent> {
        if text.is_empty() {
            return Vec::new();
        }
        let mut events = Vec::new();
        let index = match self.text_block_index {
            Some(index) => index,
            None => {
                let index = self.next_block_index;
                self.next_block_index += 1;
                self.text_block_index = Some(index);
                events.push(StreamEvent::ContentBlockStart {
                    index,
                    content_block: ContentBlockStart::Text {
                        text: String::new(),
                    },
                });
                index
            }
        };
        events.push(StreamEvent::ContentBlockDelta {
            index,
            delta: ContentBlockDelta::TextDelta {
                text: text.to_string(),
            },
        });
        events
    }

    fn emit_tool_call(
        &mut self,
        call: &gway_protocol::openai::response::ToolCallDelta,
    ) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        let key = call.index;
        let is_new = !self.tool_blocks.contains_key(&key);

        let block_index = if is_new {
            let block_index = self.next_block_index;
            self.next_block_index += 1;
            let id = call.id.clone().unwrap_or_else(|| format!("toolcall-{key}"));
            let name = call
                .function
                .as_ref()
                .and_then(|f| f.name.clone())
                .unwrap_or_else(|| "tool".to_string());
            events.push(StreamEvent::ContentBlockStart {
                index: block_index,
                content_block: ContentBlockStart::ToolUse { id, name, input: serde_json::json!({}) },
            });
            self.tool_blocks.insert(key, ToolBlockInfo { block_index });
            block_index
        } else {
            self.tool_blocks.get(&key).unwrap().block_index
        };

        if let Some(arguments) = call.function.as_ref().and_then(|f| f.arguments.clone()) {
            if !arguments.is_empty() {
                events.push(StreamEvent::ContentBlockDelta {
                    index: block_index,
                    delta: ContentBlockDelta::InputJsonDelta {
                        partial_json: arguments,
                    },
                });
            }
        }

        events
    }

    fn close_open_blocks(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if let Some(index) = self.text_block_index.take() {
            events.push(StreamEvent::ContentBlockStop { index });
        }
        for (_, info) in std::mem::take(&mut self.tool_blocks) {
            events.push(StreamEvent::ContentBlockStop {
                index: info.block_index,
            });
        }
        events
    }
}

fn map_usage(usage: OpenAiUsage) -> AnthropicUsage {
    AnthropicUsage {
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gway_protocol::openai::response::{ChoiceDelta, ChunkChoice, FunctionCallDelta, ToolCallDelta};

    fn chunk(delta: ChoiceDelta, finish_reason: Option<&str>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: "chunk-1".to_string(),
            object: "chat.completion.chunk".to_string(),
            model: "gpt-4o".to_string(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason: finish_reason.map(|s| s.to_string()),
            }],
            usage: None,
        }
    }

    #[test]
    fn first_assistant_chunk_emits_message_start_once() {
        let mut state = OpenAiToAnthropicStreamState::new();
        let events = state.transform_chunk(chunk(
            ChoiceDelta {
                role: Some("assistant".to_string()),
                content: None,
                tool_calls: None,
            },
            None,
        ));
        assert!(matches!(events[0], StreamEvent::MessageStart { .. }));

        let events = state.transform_chunk(chunk(
            ChoiceDelta {
                role: Some("assistant".to_string()),
                content: Some("hi".to_string()),
                tool_calls: None,
            },
            None,
        ));
        assert!(!events.iter().any(|e| matches!(e, StreamEvent::MessageStart { .. })));
    }

    #[test]
    fn text_delta_emits_block_start_then_delta() {
        let mut state = OpenAiToAnthropicStreamState::new();
        let events = state.transform_chunk(chunk(
            ChoiceDelta {
                role: Some("assistant".to_string()),
                content: Some("hi".to_string()),
                tool_calls: None,
            },
            None,
        ));
        assert!(events
            .iter()
            .any(|e| matches!(e, StreamEvent::ContentBlockStart { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, StreamEvent::ContentBlockDelta { .. })));
    }

    #[test]
    fn finish_reason_closes_blocks_and_emits_stop() {
        let mut state = OpenAiToAnthropicStreamState::new();
        state.transform_chunk(chunk(
            ChoiceDelta {
                role: Some("assistant".to_string()),
                content: Some("hi".to_string()),
                tool_calls: None,
            },
            None,
        ));
        let events = state.transform_chunk(chunk(
            ChoiceDelta {
                role: None,
                content: None,
                tool_calls: None,
            },
            Some("stop"),
        ));
        assert!(events.iter().any(|e| matches!(e, StreamEvent::ContentBlockStop { .. })));
        assert!(events.iter().any(|e| matches!(e, StreamEvent::MessageDelta { .. })));
        assert!(matches!(events.last().unwrap(), StreamEvent::MessageStop));
    }

    #[test]
    fn tool_call_fragments_share_same_block_index() {
        let mut state = OpenAiToAnthropicStreamState::new();
        state.transform_chunk(chunk(
            ChoiceDelta {
                role: Some("assistant".to_string()),
                content: None,
                tool_calls: None,
            },
            None,
        ));
        let events = state.transform_chunk(chunk(
            ChoiceDelta {
                role: None,
                content: None,
                tool_calls: Some(vec![ToolCallDelta {
                    index: 0,
                    id: Some("call-1".to_string()),
                    function: Some(FunctionCallDelta {
                        name: Some("get_weather".to_string()),
                        arguments: Some("{\"city\":".to_string()),
                    }),
                }]),
            },
            None,
        ));
        assert!(events
            .iter()
            .any(|e| matches!(e, StreamEvent::ContentBlockStart { .. })));

        let events = state.transform_chunk(chunk(
            ChoiceDelta {
                role: None,
                content: None,
                tool_calls: Some(vec![ToolCallDelta {
                    index: 0,
                    id: None,
                    function: Some(FunctionCallDelta {
                        name: None,
                        arguments: Some("\"nyc\"}".to_string()),
                    }),
                }]),
            },
            None,
        ));
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::ContentBlockDelta { .. }));
    }
}
