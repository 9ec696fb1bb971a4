// MQTT side of the bridge. Connects to the broker with `rumqttc`, subscribes
// to the sensor topic on every successful ConnAck and hands each publish to
// the `Bridge`. The forward is awaited inline, so messages are handled
// strictly one at a time in delivery order and the event loop is not polled
// while an HTTP request is in flight.
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnAck, ConnectReturnCode, ConnectionError, Event, EventLoop, Incoming, MqttOptions, Outgoing, QoS,
};

use crate::bridge::Bridge;
use crate::config::BrokerConfig;

const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

pub fn mqtt_options(cfg: &BrokerConfig) -> MqttOptions {
    let mut mqttoptions = MqttOptions::new(cfg.client_id.clone(), cfg.host.clone(), cfg.port);
    mqttoptions.set_keep_alive(cfg.keep_alive);

    match &cfg.credentials {
        Some((user, pass)) => {
            mqttoptions.set_credentials(user.clone(), pass.clone());
            tracing::info!(user = %user, "using MQTT credentials from environment");
        }
        None => {
            tracing::info!("no MQTT credentials provided; connecting without authentication");
        }
    }

    mqttoptions
}

pub fn connect(cfg: &BrokerConfig) -> (AsyncClient, EventLoop) {
    tracing::info!(host = %cfg.host, port = cfg.port, keepalive = cfg.keep_alive.as_secs(), "connecting to MQTT broker");
    AsyncClient::new(mqtt_options(cfg), 10)
}

/// Called for every accepted ConnAck; queues the subscription. rumqttc
/// reports a refused ConnAck as `ConnectionError::ConnectionRefused` from
/// `poll()` instead, so the non-success branch here only guards against a
/// ConnAck handed over by other means. Returns whether the connection was
/// accepted.
pub fn on_connect(client: &AsyncClient, ack: &ConnAck, topic: &str) -> bool {
    tracing::info!(code = ?ack.code, "connected to MQTT broker");

    if ack.code != ConnectReturnCode::Success {
        tracing::error!(code = ?ack.code, "broker refused connection");
        return false;
    }

    // `try_subscribe` only queues the request; the event loop sends it on
    // the next poll.
    match client.try_subscribe(topic, QoS::AtMostOnce) {
        Ok(()) => tracing::info!(topic = %topic, "subscribing to MQTT topic"),
        Err(e) => tracing::error!(topic = %topic, error = %e, "failed to queue subscription"),
    }
    true
}

/// Run the broker loop until Ctrl-C.
pub async fn run_forever(cfg: &BrokerConfig, bridge: &Bridge) -> anyhow::Result<()> {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for Ctrl-C; running until killed");
            std::future::pending::<()>().await;
        }
    };
    run_until(cfg, bridge, ctrl_c).await
}

/// Run the broker loop until `shutdown` completes. Fails if the broker
/// cannot be reached, or refuses the connection, before the first accepted
/// ConnAck; once connected, transport errors are logged and rumqttc
/// reconnects on the next poll.
pub async fn run_until<F>(cfg: &BrokerConfig, bridge: &Bridge, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    let (client, mut eventloop) = connect(cfg);
    let mut connected = false;

    tokio::pin!(shutdown);

    loop {
        let ev = tokio::select! {
            ev = eventloop.poll() => ev,
            _ = &mut shutdown => break,
        };

        match ev {
            Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                connected |= on_connect(&client, &ack, &cfg.topic);
            }
            Ok(Event::Incoming(Incoming::Publish(p))) => {
                tracing::debug!(topic = %p.topic, bytes = p.payload.len(), "publish received");
                let outcome = bridge.handle_payload(&p.payload).await;
                tracing::debug!(%outcome, "message handled");
            }
            Ok(Event::Incoming(Incoming::SubAck(ack))) => {
                tracing::info!(pkid = ack.pkid, codes = ?ack.return_codes, "subscription acknowledged");
            }
            Ok(Event::Incoming(i)) => {
                tracing::trace!(packet = ?i, "incoming");
            }
            Ok(Event::Outgoing(o)) => {
                tracing::trace!(packet = ?o, "outgoing");
            }
            Err(ConnectionError::ConnectionRefused(code)) if !connected => {
                tracing::error!(code = ?code, "broker refused connection");
                return Err(anyhow::anyhow!("MQTT broker at {}:{} refused connection: {:?}", cfg.host, cfg.port, code));
            }
            Err(e) if !connected => {
                return Err(anyhow::anyhow!("could not connect to MQTT broker at {}:{}: {}", cfg.host, cfg.port, e));
            }
            Err(ConnectionError::ConnectionRefused(code)) => {
                tracing::error!(code = ?code, "broker refused reconnection");
                tokio::time::sleep(RECONNECT_BACKOFF).await;
            }
            Err(e) => {
                // Back off on errors to avoid busy loops.
                tracing::error!(error = %e, "mqtt loop error");
                tokio::time::sleep(RECONNECT_BACKOFF).await;
            }
        }
    }

    tracing::info!("shutdown requested, disconnecting from MQTT broker");
    disconnect(&client, &mut eventloop).await;
    Ok(())
}

// Queue a DISCONNECT and keep polling until it has been written, so the
// broker sees a clean close rather than a dropped socket.
async fn disconnect(client: &AsyncClient, eventloop: &mut EventLoop) {
    if let Err(e) = client.try_disconnect() {
        tracing::warn!(error = %e, "failed to queue disconnect");
        return;
    }

    let drain = async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "event loop closed while disconnecting");
                    break;
                }
            }
        }
    };

    if tokio::time::timeout(DISCONNECT_GRACE, drain).await.is_err() {
        tracing::warn!("timed out sending DISCONNECT to MQTT broker");
    }
}

//   TESTS
//
