use clap::Parser;
use gatewayd::cli::{Cli, GlobalConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let global: GlobalConfig = Cli::parse().into();
    let state = gatewayd::build_state(&global);
    let app = gatewayd::router(state);

    let bind = format!("{}:{}", global.host, global.port);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(event = "gatewayd_listening", addr = %bind);
    axum::serve(listener, app).await?;
    Ok(())
}
