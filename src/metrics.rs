// Prometheus counters for the bridge. Counters are cheap to clone (they
// share the underlying atomic) so the MQTT loop and the HTTP handlers each
// hold their own handle.
use prometheus::{IntCounter, Registry};

#[derive(Clone)]
pub struct Metrics {
    pub messages: IntCounter,
    pub forwarded: IntCounter,
    pub parse_failures: IntCounter,
    pub forward_failures: IntCounter,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            messages: IntCounter::new("mqtt_messages_total", "Total MQTT messages received")?,
            forwarded: IntCounter::new("bridge_forwarded_total", "Readings accepted by the ingestion endpoint")?,
            parse_failures: IntCounter::new("bridge_parse_failures_total", "Messages dropped because the payload did not parse")?,
            forward_failures: IntCounter::new("bridge_forward_failures_total", "Readings dropped on a non-200 status or transport error")?,
        })
    }

    pub fn register(&self, registry: &Registry) -> anyhow::Result<()> {
        registry.register(Box::new(self.messages.clone()))?;
        registry.register(Box::new(self.forwarded.clone()))?;
        registry.register(Box::new(self.parse_failures.clone()))?;
        registry.register(Box::new(self.forward_failures.clone()))?;
        Ok(())
    }
}
