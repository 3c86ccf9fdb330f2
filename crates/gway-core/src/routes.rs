use std::sync::Arc;

use axum::Router;
use axum::routing::post;

use crate::handlers::{chat_completions, messages};
use crate::state::AppState;

/// Registers the two proxy endpoints (spec §6). `axum`'s `post()` combinator already answers
/// other methods on these paths with 405, satisfying the handler contract's non-POST rejection
/// with no extra code.
pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/messages", post(messages))
        .with_state(state)
}
