use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use gway_common::GatewayError;
use tokio::sync::mpsc;

use crate::error_render::sanitize_error_message;

/// The SSE writer contract of spec §4.H: every write is flushed immediately (the underlying
/// channel has no internal buffering beyond backpressure), `Close()` is idempotent and writes
/// the `[DONE]` sentinel exactly once.
pub struct SseWriter {
    tx: mpsc::Sender<Bytes>,
    closed: Arc<AtomicBool>,
}

impl SseWriter {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self {
            tx,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn write_event(&self, data: &[u8]) -> Result<(), GatewayError> {
        self.send(format_frame(None, data)).await
    }

    pub async fn write_event_with_type(&self, event: &str, data: &[u8]) -> Result<(), GatewayError> {
        self.send(format_frame(Some(event), data)).await
    }

    /// Emits a typed `error` event with a sanitized JSON body, per spec §4.H / §7.
    pub async fn write_error(&self, err: &GatewayError) -> Result<(), GatewayError> {
        let message = sanitize_error_message(&err.message());
        let body = serde_json::json!({
            "type": "error",
            "error": { "type": "api_error", "message": message },
        });
        let bytes = serde_json::to_vec(&body).unwrap_or_else(|_| b"{}".to_vec());
        self.write_event_with_type("error", &bytes).await
    }

    /// Writes `data: [DONE]\n\n` exactly once; subsequent calls are no-ops.
    pub async fn close(&self) -> Result<(), GatewayError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.send(Bytes::from_static(b"data: [DONE]\n\n")).await
    }

    async fn send(&self, frame: Bytes) -> Result<(), GatewayError> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| GatewayError::ProtocolInvariant("sse channel closed".to_string()))
    }
}

fn format_frame(event: Option<&str>, data: &[u8]) -> Bytes {
    let mut buf = Vec::with_capacity(data.len() + 16);
    if let Some(event) = event {
        buf.extend_from_slice(b"event: ");
        buf.extend_from_slice(event.as_bytes());
        buf.push(b'\n');
    }
    buf.extend_from_slice(b"data: ");
    buf.extend_from_slice(data);
    buf.extend_from_slice(b"\n\n");
    Bytes::from(buf)
}
