pub mod anthropic2openai;
pub mod openai2anthropic;
pub mod stop_reason;
