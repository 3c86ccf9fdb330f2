use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use gway_common::{CancelToken, GatewayError};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Initial capacity reserved for the line-accumulation buffer.
pub const INITIAL_LINE_BUFFER: usize = 64 * 1024;
/// A single unterminated line beyond this size is treated as a protocol error.
pub const MAX_LINE_BUFFER: usize = 1024 * 1024;

const CHANNEL_CAPACITY: usize = 64;

/// One parsed SSE frame, normalized across the OpenAI / Anthropic / Google
/// payload shapes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SseChunk {
    pub event: Option<String>,
    pub id: Option<String>,
    pub metadata: serde_json::Map<String, Value>,
    pub data_text: Option<String>,
    pub done: bool,
}

/// Consumes a byte stream and produces a bounded channel of [`SseChunk`]s.
/// Cancelling `cancel` closes the channel with a final `Err(GatewayError::Cancelled)`.
pub fn read_sse<S>(mut body: S, cancel: CancelToken) -> SseStream
where
    S: Stream<Item = Result<Bytes, GatewayError>> + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let mut parser = FrameParser::new();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let _ = tx.send(Err(GatewayError::Cancelled)).await;
                    return;
                }
                next = body.next() => {
                    match next {
                        None => {
                            for chunk in parser.finish() {
                                if tx.send(Ok(chunk)).await.is_err() {
                                    return;
                                }
                            }
                            return;
                        }
                        Some(Err(err)) => {
                            let _ = tx.send(Err(err)).await;
                            return;
                        }
                        Some(Ok(bytes)) => match parser.push(&bytes) {
                            Ok(chunks) => {
                                for chunk in chunks {
                                    let done = chunk.done;
                                    if tx.send(Ok(chunk)).await.is_err() {
                                        return;
                                    }
                                    if done {
                                        return;
                                    }
                                }
                            }
                            Err(err) => {
                                let _ = tx.send(Err(err)).await;
                                return;
                            }
                        },
                    }
                }
            }
        }
    });

    SseStream::from_stream(ReceiverStream::new(rx))
}

/// A stream of parsed SSE chunks. `filter`/`map`/`tap` return a derived
/// stream that shares the parent's cancellation: they're adapters over the
/// same underlying channel, not new producers.
pub struct SseStream {
    inner: Pin<Box<dyn Stream<Item = Result<SseChunk, GatewayError>> + Send>>,
}

impl SseStream {
    fn from_stream<S>(inner: S) -> Self
    where
        S: Stream<Item = Result<SseChunk, GatewayError>> + Send + 'static,
    {
        Self {
            inner: Box::pin(inner),
        }
    }

    pub fn filter<F>(self, pred: F) -> SseStream
    where
        F: Fn(&SseChunk) -> bool + Send + 'static,
    {
        let filtered = self.inner.filter(move |item| {
            let keep = match item {
                Ok(chunk) => pred(chunk),
                Err(_) => true,
            };
            async move { keep }
        });
        SseStream::from_stream(filtered)
    }

    pub fn map<F>(self, f: F) -> SseStream
    where
        F: Fn(SseChunk) -> SseChunk + Send + 'static,
    {
        let mapped = self.inner.map(move |item| item.map(&f));
        SseStream::from_stream(mapped)
    }

    pub fn tap<F>(self, obs: F) -> SseStream
    where
        F: Fn(&SseChunk) + Send + 'static,
    {
        let tapped = self.inner.inspect(move |item| {
            if let Ok(chunk) = item {
                obs(chunk);
            }
        });
        SseStream::from_stream(tapped)
    }
}

impl Stream for SseStream {
    type Item = Result<SseChunk, GatewayError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

#[derive(Debug, Default)]
struct FrameParser {
    buffer: String,
    event: Option<String>,
    id: Option<String>,
    data_lines: Vec<String>,
}

impl FrameParser {
    fn new() -> Self {
        Self {
            buffer: String::with_capacity(INITIAL_LINE_BUFFER),
            ..Self::default()
        }
    }

    fn push(&mut self, chunk: &Bytes) -> Result<Vec<SseChunk>, GatewayError> {
        let text = std::str::from_utf8(chunk)
            .map_err(|_| GatewayError::ProtocolInvariant("non-utf8 SSE byte chunk".to_string()))?;
        self.buffer.push_str(text);

        let mut chunks = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            if pos > MAX_LINE_BUFFER {
                return Err(GatewayError::ProtocolInvariant(
                    "SSE line exceeded maximum buffer size".to_string(),
                ));
            }

            let mut line = self.buffer[..pos].to_string();
            self.buffer.drain(..=pos);
            if line.ends_with('\r') {
                line.pop();
            }

            if line.is_empty() {
                if let Some(chunk) = self.finish_frame() {
                    let done = chunk.done;
                    chunks.push(chunk);
                    if done {
                        return Ok(chunks);
                    }
                }
                continue;
            }

            if line.starts_with(':') {
                continue;
            }

            if let Some(value) = line.strip_prefix("event:") {
                let value = value.trim_start();
                self.event = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
                continue;
            }

            if let Some(value) = line.strip_prefix("id:") {
                let value = value.trim_start();
                self.id = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
                continue;
            }

            if let Some(value) = line.strip_prefix("data:") {
                let value = value.strip_prefix(' ').unwrap_or(value);
                self.data_lines.push(value.to_string());
                continue;
            }
        }

        if self.buffer.len() > MAX_LINE_BUFFER {
            return Err(GatewayError::ProtocolInvariant(
                "SSE line exceeded maximum buffer size".to_string(),
            ));
        }

        Ok(chunks)
    }

    fn finish(&mut self) -> Vec<SseChunk> {
        let mut out = Vec::new();
        if !self.buffer.is_empty() {
            let mut line = std::mem::take(&mut self.buffer);
            if line.ends_with('\r') {
                line.pop();
            }
            if let Some(value) = line.strip_prefix("data:") {
                let value = value.strip_prefix(' ').unwrap_or(value);
                self.data_lines.push(value.to_string());
            }
        }
        if let Some(chunk) = self.finish_frame() {
            out.push(chunk);
        }
        out
    }

    fn finish_frame(&mut self) -> Option<SseChunk> {
        if self.event.is_none() && self.id.is_none() && self.data_lines.is_empty() {
            return None;
        }

        let data = self.data_lines.join("\n");
        self.data_lines.clear();
        let event = self.event.take();
        let id = self.id.take();

        if data == "[DONE]" {
            return Some(SseChunk {
                event,
                id,
                metadata: serde_json::Map::new(),
                data_text: None,
                done: true,
            });
        }

        let mut metadata = serde_json::Map::new();
        let mut data_text = None;
        if !data.is_empty() {
            match serde_json::from_str::<Value>(&data) {
                Ok(Value::Object(map)) => {
                    data_text = extract_text(&Value::Object(map.clone()));
                    metadata = map;
                }
                Ok(_) => {}
                Err(_) => data_text = Some(data),
            }
        }

        Some(SseChunk {
            event,
            id,
            metadata,
            data_text,
            done: false,
        })
    }
}

fn extract_text(value: &Value) -> Option<String> {
    if let Some(text) = value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
    {
        return Some(text.to_string());
    }
    if let Some(text) = value.pointer("/delta/text").and_then(Value::as_str) {
        return Some(text.to_string());
    }
    if let Some(text) = value.pointer("/content_block/text").and_then(Value::as_str) {
        return Some(text.to_string());
    }
    if let Some(text) = value
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
    {
        return Some(text.to_string());
    }
    for key in ["text", "content", "message"] {
        if let Some(text) = value.get(key).and_then(Value::as_str) {
            return Some(text.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn bytes_stream(chunks: Vec<&str>) -> impl Stream<Item = Result<Bytes, GatewayError>> + Unpin {
        stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from(c.to_string()))))
    }

    #[tokio::test]
    async fn extracts_openai_delta_content() {
        let body = bytes_stream(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\n",
        ]);
        let mut out = read_sse(body, CancelToken::new());
        let chunk = out.next().await.unwrap().unwrap();
        assert_eq!(chunk.data_text.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn extracts_anthropic_delta_text() {
        let body = bytes_stream(vec!["data: {\"delta\":{\"text\":\"yo\"}}\n\n"]);
        let mut out = read_sse(body, CancelToken::new());
        let chunk = out.next().await.unwrap().unwrap();
        assert_eq!(chunk.data_text.as_deref(), Some("yo"));
    }

    #[tokio::test]
    async fn extracts_google_candidate_text() {
        let body = bytes_stream(vec![
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"sup\"}]}}]}\n\n",
        ]);
        let mut out = read_sse(body, CancelToken::new());
        let chunk = out.next().await.unwrap().unwrap();
        assert_eq!(chunk.data_text.as_deref(), Some("sup"));
    }

    #[tokio::test]
    async fn done_sentinel_terminates_stream() {
        let body = bytes_stream(vec!["data: {\"choices\":[]}\n\n", "data: [DONE]\n\n"]);
        let mut out = read_sse(body, CancelToken::new());
        let first = out.next().await.unwrap().unwrap();
        assert!(!first.done);
        let second = out.next().await.unwrap().unwrap();
        assert!(second.done);
        assert!(out.next().await.is_none());
    }

    #[tokio::test]
    async fn splits_frame_across_chunks() {
        let body = bytes_stream(vec!["data: {\"text", "\":\"split\"}\n\n"]);
        let mut out = read_sse(body, CancelToken::new());
        let chunk = out.next().await.unwrap().unwrap();
        assert_eq!(chunk.data_text.as_deref(), Some("split"));
    }

    #[tokio::test]
    async fn cancellation_yields_cancelled_error() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let body = bytes_stream(vec!["data: {\"text\":\"never seen\"}\n\n"]);
        let mut out = read_sse(body, cancel);
        let result = out.next().await.unwrap();
        assert!(matches!(result, Err(GatewayError::Cancelled)));
    }

    #[tokio::test]
    async fn filter_drops_non_matching_chunks() {
        let body = bytes_stream(vec![
            "event: keep\ndata: {\"text\":\"a\"}\n\n",
            "event: drop\ndata: {\"text\":\"b\"}\n\n",
        ]);
        let out = read_sse(body, CancelToken::new());
        let filtered = out.filter(|c| c.event.as_deref() == Some("keep"));
        let results: Vec<_> = filtered.collect().await;
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].as_ref().unwrap().data_text.as_deref(),
            Some("a")
        );
    }

    #[tokio::test]
    async fn map_transforms_chunks() {
        let body = bytes_stream(vec!["data: {\"text\":\"a\"}\n\n"]);
        let out = read_sse(body, CancelToken::new());
        let mapped = out.map(|mut c| {
            c.data_text = c.data_text.map(|t| t.to_uppercase());
            c
        });
        let results: Vec<_> = mapped.collect().await;
        assert_eq!(
            results[0].as_ref().unwrap().data_text.as_deref(),
            Some("A")
        );
    }
}
