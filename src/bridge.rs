// Per-message work: decode, parse, forward. Each message is independent;
// nothing carries over from one call to the next except the counters.
use std::fmt;

use reqwest::StatusCode;

use crate::forwarder::{ForwardOutcome, Forwarder};
use crate::metrics::Metrics;
use crate::reading::{self, ParseError};

/// What happened to one inbound message.
#[derive(Debug, PartialEq)]
pub enum MessageOutcome {
    Forwarded,
    Rejected(StatusCode),
    ParseFailed(ParseError),
    TransportFailed(String),
}

impl fmt::Display for MessageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageOutcome::Forwarded => write!(f, "forwarded"),
            MessageOutcome::Rejected(status) => write!(f, "rejected with status {}", status.as_u16()),
            MessageOutcome::ParseFailed(e) => write!(f, "parse failed: {}", e),
            MessageOutcome::TransportFailed(e) => write!(f, "transport failed: {}", e),
        }
    }
}

pub struct Bridge {
    forwarder: Forwarder,
    metrics: Metrics,
}

impl Bridge {
    pub fn new(forwarder: Forwarder, metrics: Metrics) -> Self {
        Self { forwarder, metrics }
    }

    /// Handle one MQTT payload end to end. Never returns an error: every
    /// failure is logged, counted and reported through the outcome so the
    /// MQTT loop can carry on with the next message.
    pub async fn handle_payload(&self, payload: &[u8]) -> MessageOutcome {
        self.metrics.messages.inc();
        tracing::info!(payload = %String::from_utf8_lossy(payload), "message received");

        let reading = match reading::parse_bytes(payload) {
            Ok(r) => r,
            Err(e) => {
                self.metrics.parse_failures.inc();
                tracing::warn!(error = %e, "dropping message with unparseable payload");
                return MessageOutcome::ParseFailed(e);
            }
        };

        match self.forwarder.forward(&reading).await {
            Ok(ForwardOutcome::Accepted) => {
                self.metrics.forwarded.inc();
                tracing::info!(
                    ext = reading.external_temperature,
                    axil = reading.axial_temperature,
                    hum = reading.humidity,
                    "reading sent to ingestion endpoint"
                );
                MessageOutcome::Forwarded
            }
            Ok(ForwardOutcome::Rejected(status)) => {
                self.metrics.forward_failures.inc();
                tracing::error!(status = status.as_u16(), "ingestion endpoint rejected reading: {}", status.as_u16());
                MessageOutcome::Rejected(status)
            }
            Err(e) => {
                self.metrics.forward_failures.inc();
                tracing::error!(error = %e, url = self.forwarder.update_url(), "failed to send reading");
                MessageOutcome::TransportFailed(e.to_string())
            }
        }
    }
}


//   TESTS
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forwarder::tests::{dead_url, spawn_stub};

    fn bridge(url: &str) -> (Bridge, Metrics) {
        let metrics = Metrics::new().unwrap();
        (Bridge::new(Forwarder::new(url, "KEY"), metrics.clone()), metrics)
    }

    #[tokio::test]
    async fn test_end_to_end_success() {
        let stub = spawn_stub(vec![200]).await;
        let (bridge, metrics) = bridge(&stub.url);

        let outcome = bridge.handle_payload(b"ext=22.5, axil=25.0, hum=60.3").await;
        assert_eq!(outcome, MessageOutcome::Forwarded);

        let received = stub.received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["field1"], "22.5");
        assert_eq!(received[0]["field2"], "25.0");
        assert_eq!(received[0]["field3"], "60.3");
        assert_eq!(received[0]["api_key"], "KEY");
        assert_eq!(metrics.messages.get(), 1);
        assert_eq!(metrics.forwarded.get(), 1);
    }

    #[tokio::test]
    async fn test_bad_payload_makes_no_request_and_next_message_still_goes_out() {
        let stub = spawn_stub(vec![200]).await;
        let (bridge, metrics) = bridge(&stub.url);

        let outcome = bridge.handle_payload(b"ext=abc, axil=25.0, hum=60.3").await;
        assert!(matches!(outcome, MessageOutcome::ParseFailed(ParseError::InvalidNumber { index: 0, .. })));
        assert!(stub.received.lock().unwrap().is_empty(), "no HTTP call on parse failure");

        let outcome = bridge.handle_payload(b"ext=1.0, axil=2.0").await;
        assert!(matches!(outcome, MessageOutcome::ParseFailed(ParseError::MissingField { found: 2 })));
        assert!(stub.received.lock().unwrap().is_empty());

        let outcome = bridge.handle_payload(b"ext=20.0, axil=21.0, hum=55.0").await;
        assert_eq!(outcome, MessageOutcome::Forwarded);
        assert_eq!(stub.received.lock().unwrap().len(), 1);

        assert_eq!(metrics.messages.get(), 3);
        assert_eq!(metrics.parse_failures.get(), 2);
        assert_eq!(metrics.forwarded.get(), 1);
    }

    #[tokio::test]
    async fn test_rejected_status_is_distinguishable() {
        let stub = spawn_stub(vec![500, 200]).await;
        let (bridge, metrics) = bridge(&stub.url);

        let outcome = bridge.handle_payload(b"ext=1, axil=2, hum=3").await;
        assert_eq!(outcome, MessageOutcome::Rejected(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(outcome.to_string(), "rejected with status 500");

        let outcome = bridge.handle_payload(b"ext=1, axil=2, hum=3").await;
        assert_eq!(outcome, MessageOutcome::Forwarded);
        assert_eq!(metrics.forward_failures.get(), 1);
        assert_eq!(metrics.forwarded.get(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_is_contained() {
        let (bridge, metrics) = bridge(&dead_url().await);

        let first = bridge.handle_payload(b"ext=1, axil=2, hum=3").await;
        assert!(matches!(first, MessageOutcome::TransportFailed(_)));

        // The handler is still usable for the next message.
        let second = bridge.handle_payload(b"ext=4, axil=5, hum=6").await;
        assert!(matches!(second, MessageOutcome::TransportFailed(_)));
        assert_eq!(metrics.messages.get(), 2);
        assert_eq!(metrics.forward_failures.get(), 2);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_dropped() {
        let stub = spawn_stub(vec![200]).await;
        let (bridge, _) = bridge(&stub.url);
        let outcome = bridge.handle_payload(&[0xc3, 0x28]).await;
        assert_eq!(outcome, MessageOutcome::ParseFailed(ParseError::InvalidUtf8));
        assert!(stub.received.lock().unwrap().is_empty());
    }
}
