use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use http::{HeaderMap, Method};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use gway_common::{CancelToken, GatewayError, Headers, header_get, header_set, sanitize_api_key};
use gway_protocol::{RateLimitInfo, parse_rate_limit_headers};

use crate::backoff::{self, RetryConfig};
use crate::client::{self, PoolConfig};

/// An already-constructed outbound request, body fully buffered for replay across attempts.
#[derive(Debug, Clone)]
pub struct EngineRequest {
    pub method: Method,
    pub url: String,
    pub headers: Headers,
    pub body: Option<Bytes>,
}

impl EngineRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        header_set(&mut self.headers, name, value);
        self
    }

    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Debug, Clone)]
pub struct EngineResponseMeta {
    pub status: u16,
    pub headers: Headers,
    pub rate_limit: Option<RateLimitInfo>,
    pub attempts: u32,
}

pub enum EngineBody {
    Buffered(Bytes),
    Stream(Pin<Box<dyn Stream<Item = Result<Bytes, GatewayError>> + Send>>),
}

pub struct EngineResponse {
    pub meta: EngineResponseMeta,
    pub body: EngineBody,
}

/// Hooks run around each attempt. `before_request`/`on_retry` may abort by returning an
/// error; `after_response`/`on_error` are observational.
#[async_trait]
pub trait EngineHooks: Send + Sync {
    async fn before_request(&self, _req: &mut EngineRequest, _attempt: u32) -> Result<(), GatewayError> {
        Ok(())
    }
    async fn after_response(&self, _meta: &EngineResponseMeta, _attempt: u32) {}
    async fn on_error(&self, _err: &GatewayError, _attempt: u32) {}
    async fn on_retry(&self, _attempt: u32, _delay: Duration) -> Result<(), GatewayError> {
        Ok(())
    }
}

pub struct NoopHooks;

#[async_trait]
impl EngineHooks for NoopHooks {}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub base_url: Option<String>,
    pub credential: Option<String>,
    pub attempt_timeout: Duration,
    pub pool: PoolConfig,
    pub retry: RetryConfig,
    pub proxy: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            credential: None,
            attempt_timeout: Duration::from_secs(30),
            pool: PoolConfig::default(),
            retry: RetryConfig::default(),
            proxy: None,
        }
    }
}

/// `Do(request) -> (response, error)` (spec §4.A), against a process-wide `wreq::Client`.
/// `host_semaphores` enforces `PoolConfig::max_per_host`, the one pool bound `wreq` itself has
/// no hook for (see `client::shared_client`'s doc comment).
pub struct Engine {
    client: std::sync::Arc<wreq::Client>,
    config: EngineConfig,
    host_semaphores: StdMutex<HashMap<String, std::sync::Arc<Semaphore>>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, GatewayError> {
        let client = client::shared_client(&config.pool, config.proxy.as_deref())?;
        Ok(Self { client, config, host_semaphores: StdMutex::new(HashMap::new()) })
    }

    async fn acquire_host_permit(&self, host: &str) -> OwnedSemaphorePermit {
        let semaphore = {
            let mut map = self.host_semaphores.lock().expect("host semaphore map poisoned");
            map.entry(host.to_string())
                .or_insert_with(|| std::sync::Arc::new(Semaphore::new(self.config.pool.max_per_host.max(1))))
                .clone()
        };
        semaphore.acquire_owned().await.expect("semaphore is never closed")
    }

    pub async fn do_request(
        &self,
        mut request: EngineRequest,
        want_stream: bool,
        hooks: &dyn EngineHooks,
        cancel: Option<&CancelToken>,
    ) -> Result<EngineResponse, GatewayError> {
        if header_get(&request.headers, "authorization").is_none() {
            if let Some(credential) = &self.config.credential {
                header_set(&mut request.headers, "Authorization", format!("Bearer {credential}"));
            }
        }

        let mut attempt: u32 = 1;
        loop {
            hooks.before_request(&mut request, attempt).await?;

            let started = Instant::now();
            tracing::info!(
                event = "upstream_request",
                method = %request.method,
                url = %sanitize_url_for_log(&request.url),
                attempt,
                is_stream = want_stream,
            );

            let target_url = self.target_url(&request);
            let builder = self.build_request(&request, &target_url)?;
            let _permit = self.acquire_host_permit(extract_host(&target_url)).await;
            let send_result = match cancel {
                Some(cancel) => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
                        res = builder.send() => res,
                    }
                }
                None => builder.send().await,
            };
            drop(_permit);

            let response = match send_result {
                Ok(response) => response,
                Err(err) => {
                    let gateway_err = GatewayError::UpstreamTransport(err.to_string());
                    hooks.on_error(&gateway_err, attempt).await;
                    tracing::warn!(
                        event = "upstream_response",
                        status = "error",
                        attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        error = %err,
                    );
                    return Err(gateway_err);
                }
            };

            let status = response.status().as_u16();
            let header_map = response.headers().clone();

            if backoff::is_retryable_status(status) && attempt < self.config.retry.max_attempts {
                let _ = response.bytes().await;
                let delay = backoff::compute_delay(&self.config.retry, attempt - 1, backoff::sample_jitter());
                tracing::info!(
                    event = "upstream_response",
                    status,
                    attempt,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    retrying = true,
                );
                hooks.on_retry(attempt, delay).await?;
                match cancel {
                    Some(cancel) => {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    None => tokio::time::sleep(delay).await,
                }
                attempt += 1;
                continue;
            }

            let rate_limit = parse_rate_limit_headers(&header_map);
            let headers = headers_to_pairs(&header_map);
            let meta = EngineResponseMeta {
                status,
                headers,
                rate_limit,
                attempts: attempt,
            };

            let body = if (200..300).contains(&status) && want_stream {
                let stream = response
                    .bytes_stream()
                    .map(|item| item.map_err(|err| GatewayError::UpstreamTransport(err.to_string())));
                EngineBody::Stream(Box::pin(stream))
            } else {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|err| GatewayError::UpstreamTransport(err.to_string()))?;
                EngineBody::Buffered(bytes)
            };

            tracing::info!(
                event = "upstream_response",
                status,
                attempt,
                elapsed_ms = started.elapsed().as_millis() as u64,
                is_stream = want_stream,
            );
            hooks.after_response(&meta, attempt).await;
            return Ok(EngineResponse { meta, body });
        }
    }

    fn target_url(&self, request: &EngineRequest) -> String {
        match &self.config.base_url {
            Some(base) => format!("{base}{}", request.url),
            None => request.url.clone(),
        }
    }

    fn build_request(&self, request: &EngineRequest, url: &str) -> Result<wreq::RequestBuilder, GatewayError> {
        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .timeout(self.config.attempt_timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        Ok(builder)
    }
}

fn headers_to_pairs(headers: &HeaderMap) -> Headers {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

/// Authority (`host[:port]`) of a URL, used only as the per-host semaphore key.
fn extract_host(url: &str) -> &str {
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    without_scheme.split('/').next().unwrap_or(without_scheme)
}

/// Logs never carry the full URL query string unredacted; callers pass credentials in headers,
/// not query params, but a stray `key=` in a URL is masked defensively.
fn sanitize_url_for_log(url: &str) -> String {
    match url.split_once('?') {
        None => url.to_string(),
        Some((path, query)) => {
            let masked: Vec<String> = query
                .split('&')
                .map(|pair| match pair.split_once('=') {
                    Some((k, v)) if v.len() > 8 => format!("{k}={}", sanitize_api_key(v)),
                    _ => pair.to_string(),
                })
                .collect();
            format!("{path}?{}", masked.join("&"))
        }
    }
}
