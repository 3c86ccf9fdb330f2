use std::sync::{Arc, OnceLock};
use std::time::Duration;

use gway_common::GatewayError;

/// Connection pool sizing, spec defaults 100/10/10/90s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolConfig {
    pub max_idle_total: usize,
    pub max_idle_per_host: usize,
    pub max_per_host: usize,
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_total: 100,
            max_idle_per_host: 10,
            max_per_host: 10,
            idle_timeout: Duration::from_secs(90),
        }
    }
}

struct SharedClient {
    pool: PoolConfig,
    proxy: Option<String>,
    client: Arc<wreq::Client>,
}

static SHARED_CLIENT: OnceLock<SharedClient> = OnceLock::new();

/// Builds (or returns the already-built) process-wide `wreq::Client`. `wreq` only exposes pool
/// sizing per-host: `max_idle_per_host`/`idle_timeout` map straight onto the builder here.
/// `max_per_host` (concurrent in-flight requests to one host) is enforced separately by
/// `Engine`'s own per-host semaphore, keyed off this same `PoolConfig`. `max_idle_total` (a cap
/// on idle connections summed across all hosts) has no transport hook to attach to and is not
/// enforced; a deployment that needs it bounded has to front this gateway with its own pool.
pub fn shared_client(pool: &PoolConfig, proxy: Option<&str>) -> Result<Arc<wreq::Client>, GatewayError> {
    let proxy_owned = proxy.map(|value| value.to_string());
    if let Some(shared) = SHARED_CLIENT.get() {
        if shared.proxy != proxy_owned || shared.pool != *pool {
            return Err(GatewayError::UpstreamTransport(
                "engine client already initialized with a different pool/proxy configuration".into(),
            ));
        }
        return Ok(shared.client.clone());
    }

    let mut builder = wreq::Client::builder()
        .pool_max_idle_per_host(pool.max_idle_per_host)
        .pool_idle_timeout(pool.idle_timeout);
    if let Some(proxy_url) = proxy {
        let proxy = wreq::Proxy::all(proxy_url)
            .map_err(|err| GatewayError::UpstreamTransport(err.to_string()))?;
        builder = builder.proxy(proxy);
    }

    let client = builder
        .build()
        .map_err(|err| GatewayError::UpstreamTransport(err.to_string()))?;
    let shared = SharedClient {
        pool: *pool,
        proxy: proxy_owned,
        client: Arc::new(client),
    };
    let _ = SHARED_CLIENT.set(shared);
    Ok(SHARED_CLIENT
        .get()
        .expect("shared client must be set")
        .client
        .clone())
}
