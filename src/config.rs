// Runtime configuration, read once from the environment at startup.
// Broker settings default to a local unauthenticated broker on
// localhost:1883; the ingestion API key has no default and must be set.
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, Context};

pub const DEFAULT_TOPIC: &str = "incubadora/data";
pub const DEFAULT_UPDATE_URL: &str = "https://api.thingspeak.com/update";
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 1883;
const DEFAULT_KEEPALIVE_SECS: u64 = 60;
const DEFAULT_CLIENT_ID: &str = "incubadora_bridge";

#[derive(Debug, Clone, PartialEq)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub keep_alive: Duration,
    pub client_id: String,
    pub credentials: Option<(String, String)>,
    pub topic: String,
}

#[derive(Clone, PartialEq)]
pub struct Config {
    pub broker: BrokerConfig,
    pub update_url: String,
    pub api_key: String,
    pub metrics_addr: Option<SocketAddr>,
}

// Keeps the API key out of logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("broker", &self.broker)
            .field("update_url", &self.update_url)
            .field("api_key", &"*******")
            .field("metrics_addr", &self.metrics_addr)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup. Empty
    /// values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let (host, port) = match (var("MQTT_HOST"), var("MQTT_PORT")) {
            (None, None) => (DEFAULT_HOST.to_string(), DEFAULT_PORT),
            (Some(host), Some(port)) => {
                let p = port
                    .parse::<u16>()
                    .map_err(|e| anyhow!("Invalid MQTT_PORT value, expected a number, got: {}", e))?;
                (host, p)
            }
            (Some(host), None) => (host, DEFAULT_PORT),
            (None, Some(_)) => {
                return Err(anyhow!("MQTT_HOST must be set if MQTT_PORT is provided"));
            }
        };

        let keep_alive_secs = match var("MQTT_KEEPALIVE") {
            Some(v) => v.parse::<u64>().context("Invalid MQTT_KEEPALIVE value, expected seconds")?,
            None => DEFAULT_KEEPALIVE_SECS,
        };

        let credentials = match (var("MQTT_USER"), var("MQTT_PASS")) {
            (Some(user), Some(pass)) => Some((user, pass)),
            (Some(_), None) | (None, Some(_)) => {
                tracing::warn!("MQTT credentials incomplete: both MQTT_USER and MQTT_PASS must be set to enable auth");
                None
            }
            (None, None) => None,
        };

        let api_key = var("THINGSPEAK_API_KEY")
            .ok_or_else(|| anyhow!("THINGSPEAK_API_KEY environment variable must be set"))?;

        let metrics_addr = var("METRICS_ADDR")
            .map(|a| a.parse::<SocketAddr>().with_context(|| format!("Invalid METRICS_ADDR: {}", a)))
            .transpose()?;

        Ok(Config {
            broker: BrokerConfig {
                host,
                port,
                keep_alive: Duration::from_secs(keep_alive_secs),
                client_id: var("MQTT_CLIENT_ID").unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
                credentials,
                topic: var("MQTT_TOPIC").unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
            },
            update_url: var("THINGSPEAK_UPDATE_URL").unwrap_or_else(|| DEFAULT_UPDATE_URL.to_string()),
            api_key,
            metrics_addr,
        })
    }
}


//   TESTS
//
