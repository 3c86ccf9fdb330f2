use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use gatewayd::cli::GlobalConfig;
use serde_json::{Value, json};
use tower::ServiceExt;

fn app() -> axum::Router {
    let state = gatewayd::build_state(&GlobalConfig::default());
    gatewayd::router(state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn rejects_invalid_json_with_400() {
    let response = app()
        .oneshot(
            Request::post("/v1/chat/completions")
                .header("content-type", "application/json")
                .body(Body::from("not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn rejects_missing_messages_with_400() {
    let payload = json!({ "model": "gpt-4" });
    let response = app()
        .oneshot(
            Request::post("/v1/chat/completions")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn non_post_is_rejected_with_405() {
    let response = app()
        .oneshot(Request::get("/v1/chat/completions").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

// spec.md §8 scenario 3: an Anthropic request without `max_tokens` must clear validation (the
// handler injects the 4096 default before typed deserialization) rather than fail with 400. With
// no ANTHROPIC_API_KEY set in the test process, the request should reach the credential check and
// fail with 503, not 400.
#[tokio::test]
async fn anthropic_request_without_max_tokens_passes_validation() {
    unsafe {
        std::env::remove_var("ANTHROPIC_API_KEY");
    }
    let payload = json!({
        "model": "claude-3-opus-20240229",
        "messages": [{ "role": "user", "content": "hi" }],
    });
    let response = app()
        .oneshot(
            Request::post("/v1/messages")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["type"], "error");
}

#[tokio::test]
async fn missing_credential_returns_protocol_shaped_503() {
    unsafe {
        std::env::remove_var("OPENAI_API_KEY");
    }
    let payload = json!({
        "model": "gpt-4",
        "messages": [{ "role": "user", "content": "hi" }],
    });
    let response = app()
        .oneshot(
            Request::post("/v1/chat/completions")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "invalid_request_error");
}
