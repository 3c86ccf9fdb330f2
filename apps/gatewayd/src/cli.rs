use clap::Parser;

/// Provider credential variables are read at startup, one per supported provider, since durable
/// credential storage is out of scope (spec.md Non-goals).
#[derive(Parser)]
#[command(name = "gatewayd")]
pub(crate) struct Cli {
    #[arg(long, env = "GATEWAYD_HOST", default_value = "127.0.0.1")]
    pub(crate) host: String,
    #[arg(long, env = "GATEWAYD_PORT", default_value_t = 8080)]
    pub(crate) port: u16,
    #[arg(long, env = "GATEWAYD_PROXY")]
    pub(crate) proxy: Option<String>,
    /// Seconds a selected provider's rate-limit acquire is allowed to wait before the request
    /// fails with 429.
    #[arg(long, env = "GATEWAYD_RATE_LIMIT_DEADLINE_SECS", default_value_t = 5)]
    pub(crate) rate_limit_deadline_secs: u64,
}

#[derive(Clone, Debug)]
pub struct GlobalConfig {
    pub host: String,
    pub port: u16,
    pub proxy: Option<String>,
    pub rate_limit_deadline_secs: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            proxy: None,
            rate_limit_deadline_secs: 5,
        }
    }
}

impl From<Cli> for GlobalConfig {
    fn from(cli: Cli) -> Self {
        Self {
            host: cli.host,
            port: cli.port,
            proxy: cli.proxy,
            rate_limit_deadline_secs: cli.rate_limit_deadline_secs,
        }
    }
}
