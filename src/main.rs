// `main.rs` only declares modules, sets up logging and delegates to
// `server::run()`. Parsing lives in `reading`, the HTTP POST in `forwarder`,
// per-message handling in `bridge` and the broker loop in `mqtt`.
mod bridge;
mod config;
mod forwarder;
mod handlers;
mod metrics;
mod mqtt;
mod reading;
mod server;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    server::run().await
}
