//! MQTT publisher for analytics events
//!
//! Publishes every event's JSON to the configured topic with QoS 1 so a
//! downstream collector can consume the same stream as the JSONL file.

use crate::domain::event::TelemetryEvent;
use crate::infra::config::Config;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// MQTT publisher actor
///
/// Receives events from an egress channel and publishes them.
pub struct MqttPublisher {
    client: AsyncClient,
    rx: mpsc::Receiver<TelemetryEvent>,
    topic: String,
}

impl MqttPublisher {
    /// Create a new MQTT publisher
    ///
    /// Connects to the broker at the configured MQTT host/port.
    pub fn new(config: &Config, rx: mpsc::Receiver<TelemetryEvent>) -> Self {
        let client_id = format!("navtel-egress-{}", std::process::id());
        let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
        mqttoptions.set_keep_alive(Duration::from_secs(30));
        mqttoptions.set_clean_session(true);

        if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
            mqttoptions.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(mqttoptions, 100);

        tokio::spawn(async move {
            let mut eventloop = eventloop;
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("mqtt_egress_connected");
                    }
                    Ok(Event::Incoming(Packet::PubAck(_))) => {
                        debug!("mqtt_egress_puback");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "mqtt_egress_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Self { client, rx, topic: config.mqtt_topic().to_string() }
    }

    /// Run the publisher loop until cancelled or every sender is dropped.
    /// Queued events are drained on cancellation.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(topic = %self.topic, "mqtt_egress_started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("mqtt_egress_shutdown");
                    while let Ok(event) = self.rx.try_recv() {
                        self.publish(event).await;
                    }
                    return;
                }
                event = self.rx.recv() => match event {
                    Some(event) => self.publish(event).await,
                    None => {
                        info!("mqtt_egress_channel_closed");
                        return;
                    }
                },
            }
        }
    }

    async fn publish(&self, event: TelemetryEvent) {
        let json = event.to_json();
        if let Err(e) =
            self.client.publish(&self.topic, QoS::AtLeastOnce, false, json.into_bytes()).await
        {
            error!(event = %event.kind().as_str(), error = %e, "mqtt_egress_publish_failed");
        }
    }
}
