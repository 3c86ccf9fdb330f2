pub mod error;
pub mod request;
pub mod response;

pub use error::OpenAiErrorBody;
pub use request::ChatCompletionRequest;
pub use response::{ChatCompletionChunk, ChatCompletionResponse};
