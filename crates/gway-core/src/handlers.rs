use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use gway_common::{CancelToken, GatewayError, is_hop_by_hop_or_framing_header};
use gway_http::{Engine, EngineBody, EngineRequest, NoopHooks};
use gway_limiter::{BucketKey, LimitDimension, estimate_tokens};
use gway_protocol::anthropic::request::{ContentBlock as AnthropicBlock, CreateMessageRequest, MessageContent};
use gway_protocol::anthropic::response::CreateMessageResponse;
use gway_protocol::anthropic::stream::StreamEvent;
use gway_protocol::openai::request::{ChatContent, ChatContentPart, ChatCompletionRequest};
use gway_protocol::openai::response::{ChatCompletionChunk, ChatCompletionResponse};
use gway_protocol::sse::read_sse;
use gway_router::RouteRequest;
use gway_transform::{anthropic2openai, openai2anthropic};

use crate::error_render::render_error;
use crate::protocol_kind::ProtocolKind;
use crate::sse_writer::SseWriter;
use crate::state::AppState;
use crate::upstream_table;

pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    dispatch(state, ProtocolKind::OpenAi, headers, body).await
}

pub async fn messages(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    dispatch(state, ProtocolKind::Anthropic, headers, body).await
}

/// A request deserialized and validated, protocol-agnostic past this point except for the
/// serialized bytes each branch carries.
enum ParsedRequest {
    OpenAi(ChatCompletionRequest),
    Anthropic(CreateMessageRequest),
}

impl ParsedRequest {
    fn model(&self) -> &str {
        match self {
            ParsedRequest::OpenAi(r) => &r.model,
            ParsedRequest::Anthropic(r) => &r.model,
        }
    }

    fn set_model(&mut self, model: String) {
        match self {
            ParsedRequest::OpenAi(r) => r.model = model,
            ParsedRequest::Anthropic(r) => r.model = model,
        }
    }

    fn messages_nonempty(&self) -> bool {
        match self {
            ParsedRequest::OpenAi(r) => !r.messages.is_empty(),
            ParsedRequest::Anthropic(r) => !r.messages.is_empty(),
        }
    }

    fn wants_stream(&self) -> bool {
        match self {
            ParsedRequest::OpenAi(r) => r.stream.unwrap_or(false),
            ParsedRequest::Anthropic(r) => r.stream.unwrap_or(false),
        }
    }

    fn estimated_tokens(&self) -> u64 {
        let mut text = String::new();
        match self {
            ParsedRequest::OpenAi(r) => {
                for message in &r.messages {
                    match &message.content {
                        Some(ChatContent::Text(t)) => text.push_str(t),
                        Some(ChatContent::Parts(parts)) => {
                            for part in parts {
                                if let ChatContentPart::Text { text: t } = part {
                                    text.push_str(t);
                                }
                            }
                        }
                        None => {}
                    }
                }
            }
            ParsedRequest::Anthropic(r) => {
                if let Some(system) = &r.system {
                    text.push_str(system);
                }
                for message in &r.messages {
                    match &message.content {
                        MessageContent::Text(t) => text.push_str(t),
                        MessageContent::Blocks(blocks) => {
                            for block in blocks {
                                if let AnthropicBlock::Text { text: t } = block {
                                    text.push_str(t);
                                }
                            }
                        }
                    }
                }
            }
        }
        estimate_tokens(&text)
    }
}

/// Common handler contract shared by both protocol entrypoints (spec §4.H).
async fn dispatch(state: Arc<AppState>, protocol: ProtocolKind, headers: HeaderMap, body: Bytes) -> Response {
    let trace_id = Uuid::new_v4().to_string();
    tracing::info!(event = "downstream_received", trace_id = %trace_id, protocol = ?protocol, bytes = body.len());

    let mut value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(err) => {
            return render_error(
                &GatewayError::InvalidRequest(format!("invalid JSON body: {err}")),
                protocol,
            );
        }
    };

    if protocol == ProtocolKind::Anthropic {
        let needs_default = value
            .get("max_tokens")
            .is_none_or(|v| v.is_null());
        if needs_default {
            if let Value::Object(map) = &mut value {
                map.insert("max_tokens".to_string(), Value::from(4096));
            }
        }
    }

    let parsed = match protocol {
        ProtocolKind::OpenAi => serde_json::from_value::<ChatCompletionRequest>(value).map(ParsedRequest::OpenAi),
        ProtocolKind::Anthropic => {
            serde_json::from_value::<CreateMessageRequest>(value).map(ParsedRequest::Anthropic)
        }
    };
    let mut request = match parsed {
        Ok(r) => r,
        Err(err) => {
            return render_error(
                &GatewayError::InvalidRequest(format!("request did not match the expected schema: {err}")),
                protocol,
            );
        }
    };

    if request.model().is_empty() || !request.messages_nonempty() {
        return render_error(
            &GatewayError::InvalidRequest("model must be non-empty and at least one message is required".to_string()),
            protocol,
        );
    }

    let tenant = header_value(&headers, "x-client-id").unwrap_or_else(|| "default".to_string());
    let (remapped_model, remapped_provider) = state.remapper.remap(request.model(), &tenant);
    request.set_model(remapped_model.clone());

    let estimated_tokens = request.estimated_tokens();
    let route_request = RouteRequest {
        capability: "chat".to_string(),
        estimated_tokens,
        required_models: vec![remapped_model],
        exclude_providers: Vec::new(),
        ..Default::default()
    };

    let decision = match state.routing.route(&route_request, state.strategy).await {
        Ok(decision) => decision,
        Err(err) => return render_error(&err, protocol),
    };
    let Some(selected) = decision.selected else {
        return render_error(&GatewayError::NoProvidersMatch, protocol);
    };

    let _ = remapped_provider; // routing has final say on provider per spec §2's reselection step
    request.set_model(selected.model.clone());

    let Some(credential) = state.key_provider.credential_for(&selected.provider) else {
        return render_error(&GatewayError::NoCredential, protocol);
    };

    if let Some(limiter) = state.rate_limits.limiter_for(&selected.provider, &selected.plan).await {
        let rpm_key = BucketKey::new(&selected.provider, &selected.plan, LimitDimension::Rpm);
        let tpm_key = BucketKey::new(&selected.provider, &selected.plan, LimitDimension::Tpm);
        let requests = vec![(rpm_key, 1), (tpm_key, estimated_tokens.max(1))];
        let cancel = CancelToken::new();
        let task_cancel = cancel.clone();

        // Run the acquire on its own task so a deadline timeout can signal `cancel` and then
        // keep polling the same in-flight future to completion, instead of timeout's usual
        // abandon-on-elapsed behavior, which would drop the future mid-acquire and leak any
        // already-acquired leg (e.g. RPM granted while still waiting on TPM).
        let mut acquire_task =
            tokio::spawn(async move { limiter.acquire_all(&requests, Some(&task_cancel)).await });

        let acquired = match tokio::time::timeout(state.rate_limit_deadline, &mut acquire_task).await {
            Ok(joined) => joined.unwrap_or(Err(GatewayError::Cancelled)),
            Err(_) => {
                cancel.cancel();
                acquire_task.await.unwrap_or(Err(GatewayError::Cancelled))
            }
        };
        if acquired.is_err() {
            return render_error(&GatewayError::RateLimitExceeded, protocol);
        }
    }

    let (base_url, upstream_style) = upstream_table::lookup(&selected.provider, protocol);
    let path = match upstream_style {
        ProtocolKind::OpenAi => "/v1/chat/completions",
        ProtocolKind::Anthropic => "/v1/messages",
    };
    let auth_headers = upstream_table::auth_headers(upstream_style, &credential);

    let outbound_body = match build_outbound_body(&request, upstream_style) {
        Ok(bytes) => bytes,
        Err(err) => return render_error(&err, protocol),
    };

    let want_stream = request.wants_stream();
    // `auth_headers` above already carries the provider-keyed credential (Bearer for OpenAI-style,
    // x-api-key for Anthropic-style). Only pass it to the engine too when that's the same Bearer
    // scheme the engine would inject by default; otherwise the Anthropic request would end up
    // with both a correct x-api-key header and a spurious, unspecified Authorization: Bearer one.
    let engine_credential = match upstream_style {
        ProtocolKind::OpenAi => Some(credential),
        ProtocolKind::Anthropic => None,
    };
    let engine = match Engine::new(state.engine_config(base_url, engine_credential, want_stream)) {
        Ok(engine) => engine,
        Err(err) => return render_error(&err, protocol),
    };

    let mut engine_request = EngineRequest::new(Method::POST, path)
        .with_header("content-type", "application/json")
        .with_body(outbound_body);
    for (name, value) in auth_headers {
        engine_request = engine_request.with_header(name, value);
    }

    if want_stream {
        stream_response(state, engine, engine_request, protocol, upstream_style, selected.provider).await
    } else {
        unary_response(state, engine, engine_request, protocol, upstream_style, selected.provider).await
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(|v| v.to_string())
}

fn build_outbound_body(request: &ParsedRequest, upstream_style: ProtocolKind) -> Result<Bytes, GatewayError> {
    let serialize_err = |err: serde_json::Error| GatewayError::ProtocolInvariant(format!("failed to encode outbound request: {err}"));

    let bytes = match (request, upstream_style) {
        (ParsedRequest::OpenAi(r), ProtocolKind::OpenAi) => serde_json::to_vec(r).map_err(serialize_err)?,
        (ParsedRequest::Anthropic(r), ProtocolKind::Anthropic) => serde_json::to_vec(r).map_err(serialize_err)?,
        (ParsedRequest::OpenAi(r), ProtocolKind::Anthropic) => {
            let translated = openai2anthropic::transform_request(r.clone());
            serde_json::to_vec(&translated).map_err(serialize_err)?
        }
        (ParsedRequest::Anthropic(r), ProtocolKind::OpenAi) => {
            let translated = anthropic2openai::transform_request(r.clone());
            serde_json::to_vec(&translated).map_err(serialize_err)?
        }
    };
    Ok(Bytes::from(bytes))
}

async fn unary_response(
    state: Arc<AppState>,
    engine: Engine,
    engine_request: EngineRequest,
    protocol: ProtocolKind,
    upstream_style: ProtocolKind,
    provider: String,
) -> Response {
    let cancel = CancelToken::new();
    let started = Instant::now();
    let result = engine.do_request(engine_request, false, &NoopHooks, Some(&cancel)).await;

    let response = match result {
        Ok(response) => response,
        Err(err) => {
            state.health.record_failure(&provider).await;
            return render_error(&err, protocol);
        }
    };

    let status = response.meta.status;
    if (200..300).contains(&status) {
        state.health.record_success(&provider, started.elapsed().as_millis() as f64).await;
    } else {
        state.health.record_failure(&provider).await;
    }

    let body_bytes = match response.body {
        EngineBody::Buffered(bytes) => bytes,
        EngineBody::Stream(_) => {
            return render_error(
                &GatewayError::ProtocolInvariant("unary call unexpectedly returned a streamed body".to_string()),
                protocol,
            );
        }
    };

    if !(200..300).contains(&status) {
        return passthrough_response(status, &response.meta.headers, body_bytes);
    }

    if protocol == upstream_style {
        return passthrough_response(status, &response.meta.headers, body_bytes);
    }

    match translate_unary_response(upstream_style, &body_bytes) {
        Ok(translated) => passthrough_response(status, &response.meta.headers, translated),
        Err(err) => render_error(&err, protocol),
    }
}

fn translate_unary_response(upstream_style: ProtocolKind, body: &[u8]) -> Result<Bytes, GatewayError> {
    let parse_err = |err: serde_json::Error| {
        GatewayError::ProtocolInvariant(format!("upstream response did not match the expected schema: {err}"))
    };
    let bytes = match upstream_style {
        ProtocolKind::OpenAi => {
            let response: ChatCompletionResponse = serde_json::from_slice(body).map_err(parse_err)?;
            let translated = openai2anthropic::transform_response(response);
            serde_json::to_vec(&translated).map_err(parse_err)?
        }
        ProtocolKind::Anthropic => {
            let response: CreateMessageResponse = serde_json::from_slice(body).map_err(parse_err)?;
            let translated = anthropic2openai::transform_response(response);
            serde_json::to_vec(&translated).map_err(parse_err)?
        }
    };
    Ok(Bytes::from(bytes))
}

fn passthrough_response(status: u16, headers: &[(String, String)], body: Bytes) -> Response {
    let mut builder = Response::builder().status(StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY));
    for (name, value) in headers {
        if is_hop_by_hop_or_framing_header(name) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            axum::http::HeaderName::try_from(name.as_str()),
            axum::http::HeaderValue::from_str(value),
        ) {
            builder = builder.header(name, value);
        }
    }
    builder.body(Body::from(body)).unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

async fn stream_response(
    state: Arc<AppState>,
    engine: Engine,
    engine_request: EngineRequest,
    protocol: ProtocolKind,
    upstream_style: ProtocolKind,
    provider: String,
) -> Response {
    let (tx, rx) = mpsc::channel::<Bytes>(64);
    let writer = SseWriter::new(tx);

    tokio::spawn(async move {
        relay_stream(state, engine, engine_request, protocol, upstream_style, provider, writer).await;
    });

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, std::convert::Infallible>));
    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/event-stream")
        .header("cache-control", "no-cache")
        .header("connection", "keep-alive")
        .header("x-accel-buffering", "no")
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

async fn relay_stream(
    state: Arc<AppState>,
    engine: Engine,
    engine_request: EngineRequest,
    protocol: ProtocolKind,
    upstream_style: ProtocolKind,
    provider: String,
    writer: SseWriter,
) {
    let cancel = CancelToken::new();
    let started = Instant::now();
    let response = match engine.do_request(engine_request, true, &NoopHooks, Some(&cancel)).await {
        Ok(response) => response,
        Err(err) => {
            state.health.record_failure(&provider).await;
            let _ = writer.write_error(&err).await;
            let _ = writer.close().await;
            return;
        }
    };

    let status = response.meta.status;
    let body = match response.body {
        EngineBody::Stream(stream) => stream,
        EngineBody::Buffered(bytes) => {
            state.health.record_failure(&provider).await;
            let err = GatewayError::UpstreamStatus {
                status,
                body: bytes,
                headers: response.meta.headers,
            };
            let _ = writer.write_error(&err).await;
            let _ = writer.close().await;
            return;
        }
    };

    state.health.record_success(&provider, started.elapsed().as_millis() as f64).await;

    let mut sse = read_sse(body, cancel.clone());
    let mut openai_to_anthropic = openai2anthropic::OpenAiToAnthropicStreamState::new();
    let mut anthropic_to_openai = anthropic2openai::AnthropicToOpenAiStreamState::new();

    while let Some(item) = sse.next().await {
        match item {
            Ok(chunk) => {
                if chunk.done {
                    break;
                }
                let metadata = Value::Object(chunk.metadata.clone());
                if let Err(err) = emit_chunk(
                    &writer,
                    protocol,
                    upstream_style,
                    metadata,
                    &mut openai_to_anthropic,
                    &mut anthropic_to_openai,
                )
                .await
                {
                    tracing::warn!(event = "downstream_responded", error = %err, "failed to translate stream chunk");
                }
            }
            Err(err) => {
                let _ = writer.write_error(&err).await;
                break;
            }
        }
    }

    let _ = writer.close().await;
    tracing::info!(event = "downstream_responded", provider = %provider, status, streamed = true);
}

async fn emit_chunk(
    writer: &SseWriter,
    client_protocol: ProtocolKind,
    upstream_style: ProtocolKind,
    metadata: Value,
    openai_to_anthropic: &mut openai2anthropic::OpenAiToAnthropicStreamState,
    anthropic_to_openai: &mut anthropic2openai::AnthropicToOpenAiStreamState,
) -> Result<(), GatewayError> {
    let encode_err = |err: serde_json::Error| GatewayError::ProtocolInvariant(format!("stream frame encode failed: {err}"));

    match (upstream_style, client_protocol) {
        (ProtocolKind::OpenAi, ProtocolKind::OpenAi) => {
            let bytes = serde_json::to_vec(&metadata).map_err(encode_err)?;
            writer.write_event(&bytes).await
        }
        (ProtocolKind::Anthropic, ProtocolKind::Anthropic) => {
            let event: StreamEvent = serde_json::from_value(metadata).map_err(encode_err)?;
            let bytes = serde_json::to_vec(&event).map_err(encode_err)?;
            writer.write_event_with_type(event.event_name(), &bytes).await
        }
        (ProtocolKind::Anthropic, ProtocolKind::OpenAi) => {
            let event: StreamEvent = serde_json::from_value(metadata).map_err(encode_err)?;
            for chunk in anthropic_to_openai.transform_event(event) {
                let bytes = serde_json::to_vec(&chunk).map_err(encode_err)?;
                writer.write_event(&bytes).await?;
            }
            Ok(())
        }
        (ProtocolKind::OpenAi, ProtocolKind::Anthropic) => {
            let chunk: ChatCompletionChunk = serde_json::from_value(metadata).map_err(encode_err)?;
            for event in openai_to_anthropic.transform_chunk(chunk) {
                let bytes = serde_json::to_vec(&event).map_err(encode_err)?;
                writer.write_event_with_type(event.event_name(), &bytes).await?;
            }
            Ok(())
        }
    }
}
