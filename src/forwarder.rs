// HTTP side of the bridge: one form-encoded POST per reading to the
// ThingSpeak-style `update` endpoint. There is no retry and no local
// buffering; a reading that fails to go out is simply dropped by the caller.
use reqwest::StatusCode;
use serde::Serialize;

use crate::reading::{format_field, SensorReading};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// The endpoint answered 200.
    Accepted,
    /// Any other status. Not an error: the caller logs it and moves on.
    Rejected(StatusCode),
}

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Serialize)]
struct UpdateForm<'a> {
    api_key: &'a str,
    field1: String,
    field2: String,
    field3: String,
}

pub struct Forwarder {
    client: reqwest::Client,
    update_url: String,
    api_key: String,
}

impl Forwarder {
    /// The client is built without a request timeout; a slow endpoint holds
    /// up the MQTT loop for as long as the transport lets it.
    pub fn new(update_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            update_url: update_url.into(),
            api_key: api_key.into(),
        }
    }

    pub fn update_url(&self) -> &str {
        &self.update_url
    }

    pub async fn forward(&self, reading: &SensorReading) -> Result<ForwardOutcome, ForwardError> {
        let form = UpdateForm {
            api_key: &self.api_key,
            field1: format_field(reading.external_temperature),
            field2: format_field(reading.axial_temperature),
            field3: format_field(reading.humidity),
        };

        let resp = self.client.post(&self.update_url).form(&form).send().await?;

        match resp.status() {
            StatusCode::OK => Ok(ForwardOutcome::Accepted),
            other => Ok(ForwardOutcome::Rejected(other)),
        }
    }
}


//   TESTS
//
