mod error_render;
mod handlers;
mod protocol_kind;
mod routes;
mod sse_writer;
mod state;
mod upstream_table;

pub use error_render::{render_error, sanitize_error_message, status_for};
pub use handlers::{chat_completions, messages};
pub use protocol_kind::ProtocolKind;
pub use routes::app_router;
pub use sse_writer::SseWriter;
pub use state::{AppState, HttpDefaults};
