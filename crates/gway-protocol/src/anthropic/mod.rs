pub mod error;
pub mod request;
pub mod response;
pub mod stream;

pub use error::AnthropicErrorBody;
pub use request::CreateMessageRequest;
pub use response::CreateMessageResponse;
pub use stream::StreamEvent;
