//! Shared OpenAI `finish_reason` <-> Anthropic `stop_reason` mapping table.

/// `end_turn↔stop`, `max_tokens↔length`, `stop_sequence↔stop`,
/// `tool_use↔tool_calls`; anything unrecognized maps to `stop`.
pub fn anthropic_to_openai(stop_reason: &str) -> &'static str {
    match stop_reason {
        "end_turn" => "stop",
        "max_tokens" => "length",
        "stop_sequence" => "stop",
        "tool_use" => "tool_calls",
        "content_filter" => "stop",
        _ => "stop",
    }
}

/// `stop→end_turn`, `length→max_tokens`, `tool_calls→tool_use`,
/// `content_filter→end_turn`; anything unrecognized maps to `end_turn`.
pub fn openai_to_anthropic(finish_reason: &str) -> &'static str {
    match finish_reason {
        "stop" => "end_turn",
        "length" => "max_tokens",
        "tool_calls" | "function_call" => "tool_use",
        "content_filter" => "end_turn",
        _ => "end_turn",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_tool_use_and_stop() {
        assert_eq!(anthropic_to_openai("tool_use"), "tool_calls");
        assert_eq!(openai_to_anthropic("tool_calls"), "tool_use");
        assert_eq!(anthropic_to_openai("end_turn"), "stop");
        assert_eq!(openai_to_anthropic("stop"), "end_turn");
    }

    #[test]
    fn content_filter_maps_to_end_turn_both_ways() {
        assert_eq!(anthropic_to_openai("content_filter"), "stop");
        assert_eq!(openai_to_anthropic("content_filter"), "end_turn");
    }

    #[test]
    fn unrecognized_values_fall_back_to_default() {
        assert_eq!(anthropic_to_openai("something_else"), "stop");
        assert_eq!(openai_to_anthropic("something_else"), "end_turn");
    }
}
