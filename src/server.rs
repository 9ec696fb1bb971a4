// `server.rs` composes the service: it loads configuration, registers
// Prometheus metrics, optionally starts the metrics listener in the
// background and then runs the MQTT loop in the foreground until shutdown.
use crate::{bridge::Bridge, config::Config, forwarder::Forwarder, handlers, metrics::Metrics, mqtt};
use axum::{routing::get, Extension, Router};
use prometheus::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task;

pub async fn run() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    tracing::info!(?config, "configuration loaded");

    let registry = Arc::new(Registry::new());
    let metrics = Metrics::new()?;
    metrics.register(&registry)?;

    if let Some(addr) = config.metrics_addr {
        let registry = registry.clone();
        task::spawn(async move {
            if let Err(e) = serve_metrics(addr, registry).await {
                tracing::error!(error = %e, "metrics listener ended");
            }
        });
    }

    let bridge = Bridge::new(Forwarder::new(&config.update_url, &config.api_key), metrics);
    mqtt::run_forever(&config.broker, &bridge).await
}

pub fn router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .route("/health", get(handlers::health_handler))
        .layer(Extension(registry))
}

async fn serve_metrics(addr: SocketAddr, registry: Arc<Registry>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "metrics listening");
    axum::serve(listener, router(registry)).await?;
    Ok(())
}


//   TESTS
//
