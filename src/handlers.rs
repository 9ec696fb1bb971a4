// HTTP handlers for the optional metrics listener. Thin wrappers around the
// shared Prometheus `Registry`.
use axum::{extract::Extension, http::{header::CONTENT_TYPE, HeaderMap, HeaderValue}};
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::Arc;

/// Expose Prometheus text-format metrics gathered from the provided
/// `Registry` extension.
pub async fn metrics_handler(Extension(registry): Extension<Arc<Registry>>) -> (HeaderMap, String) {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap_or_default();
    let body = String::from_utf8_lossy(&buffer).to_string();

    let mut headers = HeaderMap::new();
    if let Ok(ct) = HeaderValue::from_str(encoder.format_type()) {
        headers.insert(CONTENT_TYPE, ct);
    }
    (headers, body)
}

pub async fn health_handler() -> &'static str {
    "ok"
}
