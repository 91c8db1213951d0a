//! MQTT publisher for egress events
//!
//! Publishes session output to MQTT topics for the app shell and dispatch:
//! - driver/decisions - Offer accept/decline decisions (QoS 1)
//! - driver/status - Trip lifecycle status (QoS 1)
//! - driver/display - Countdown, wait meter, and fence banners (QoS 0)
//! - driver/location - Throttled location pings (QoS 0)
//! - driver/surge - Rendered surge map view (QoS 0)

use crate::infra::config::Config;
use crate::io::egress_channel::EgressMessage;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// MQTT publisher actor
///
/// Receives messages from the egress channel and publishes to MQTT topics.
/// Decisions and status ride QoS 1 because dispatch acts on them; the
/// display, location, and surge streams are QoS 0 refreshes.
pub struct MqttPublisher {
    client: AsyncClient,
    rx: mpsc::Receiver<EgressMessage>,
    decisions_topic: String,
    status_topic: String,
    display_topic: String,
    location_topic: String,
    surge_view_topic: String,
}

impl MqttPublisher {
    /// Create a new MQTT publisher
    ///
    /// Connects to the broker at the configured MQTT host/port.
    pub fn new(config: &Config, rx: mpsc::Receiver<EgressMessage>) -> Self {
        let client_id = format!("trip-egress-{}", std::process::id());
        let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
        mqttoptions.set_keep_alive(Duration::from_secs(30));
        mqttoptions.set_clean_session(true);

        // Set credentials if configured
        if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
            mqttoptions.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(mqttoptions, 100);

        // Spawn the eventloop handler
        tokio::spawn(async move {
            let mut eventloop = eventloop;
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("mqtt_egress_connected");
                    }
                    Ok(Event::Incoming(Packet::PubAck(_))) => {
                        // QoS 1 acknowledgement received
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

        Self {
            client,
            rx,
            decisions_topic: config.mqtt_egress_decisions_topic().to_string(),
            status_topic: config.mqtt_egress_status_topic().to_string(),
            display_topic: config.mqtt_egress_display_topic().to_string(),
            location_topic: config.mqtt_egress_location_topic().to_string(),
            surge_view_topic: config.mqtt_egress_surge_view_topic().to_string(),
        }
    }

    /// Run the publisher loop
    ///
    /// Processes messages from the channel and publishes to MQTT.
    /// Runs until shutdown signal is received.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            decisions = %self.decisions_topic,
            status = %self.status_topic,
            display = %self.display_topic,
            location = %self.location_topic,
            surge = %self.surge_view_topic,
            "mqtt_egress_started"
        );

        loop {
            tokio::select! {
                // Check for shutdown
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("mqtt_egress_shutdown");
                        // Drain remaining messages
                        while let Ok(msg) = self.rx.try_recv() {
                            self.publish_message(msg).await;
                        }
                        return;
                    }
                }
                // Process messages
                Some(msg) = self.rx.recv() => {
                    self.publish_message(msg).await;
                }
            }
        }
    }

    async fn publish_message(&self, msg: EgressMessage) {
        match msg {
            EgressMessage::OfferDecision(payload) => {
                // QoS 1: dispatch reassigns the ride off this message
                if let Ok(json) = serde_json::to_string(&payload) {
                    if let Err(e) = self
                        .client
                        .publish(&self.decisions_topic, QoS::AtLeastOnce, false, json.as_bytes())
                        .await
                    {
                        error!(error = %e, "mqtt_egress_decision_failed");
                    }
                }
            }
            EgressMessage::TripStatus(payload) => {
                // QoS 1: lifecycle transitions must reach dispatch
                if let Ok(json) = serde_json::to_string(&payload) {
                    if let Err(e) = self
                        .client
                        .publish(&self.status_topic, QoS::AtLeastOnce, false, json.as_bytes())
                        .await
                    {
                        error!(error = %e, "mqtt_egress_status_failed");
                    }
                }
            }
            EgressMessage::OfferCountdown(payload) => {
                // QoS 0: the next second's countdown supersedes this one
                if let Ok(json) = serde_json::to_string(&payload) {
                    if let Err(e) = self
                        .client
                        .publish(&self.display_topic, QoS::AtMostOnce, false, json.as_bytes())
                        .await
                    {
                        debug!(error = %e, "mqtt_egress_countdown_failed");
                    }
                }
            }
            EgressMessage::WaitUpdate(payload) => {
                // QoS 0 for the wait meter refresh
                if let Ok(json) = serde_json::to_string(&payload) {
                    if let Err(e) = self
                        .client
                        .publish(&self.display_topic, QoS::AtMostOnce, false, json.as_bytes())
                        .await
                    {
                        debug!(error = %e, "mqtt_egress_wait_failed");
                    }
                }
            }
            EgressMessage::DestinationFence(payload) => {
                // QoS 0 for the arrival banner
                if let Ok(json) = serde_json::to_string(&payload) {
                    if let Err(e) = self
                        .client
                        .publish(&self.display_topic, QoS::AtMostOnce, false, json.as_bytes())
                        .await
                    {
                        debug!(error = %e, "mqtt_egress_fence_failed");
                    }
                }
            }
            EgressMessage::LocationPing(payload) => {
                // QoS 0 for throttled location pings
                if let Ok(json) = serde_json::to_string(&payload) {
                    if let Err(e) = self
                        .client
                        .publish(&self.location_topic, QoS::AtMostOnce, false, json.as_bytes())
                        .await
                    {
                        debug!(error = %e, "mqtt_egress_location_failed");
                    }
                }
            }
            EgressMessage::SurgeView(payload) => {
                // QoS 0 for the surge map refresh
                if let Ok(json) = serde_json::to_string(&payload) {
                    if let Err(e) = self
                        .client
                        .publish(&self.surge_view_topic, QoS::AtMostOnce, false, json.as_bytes())
                        .await
                    {
                        debug!(error = %e, "mqtt_egress_surge_failed");
                    }
                }
            }
        }
    }
}
