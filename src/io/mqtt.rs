//! MQTT client for receiving dispatch, location, pricing, and driver UI traffic

use crate::domain::offer::RideOffer;
use crate::domain::trip::epoch_ms;
use crate::domain::types::{
    DispatchPush, DriverAction, OfferMessage, PositionSample, SurgeSnapshotMessage, TripEvent,
};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Maps each subscribed topic to its payload parser.
///
/// Topics are exact-match strings from config; the router owns copies so
/// parsing stays independent of the config lifetime.
struct TopicRouter {
    offers: String,
    positions: String,
    surge: String,
    dispatch: String,
    actions: String,
    /// Fallback answer window for offers that carry no deadline of their own
    offer_window_ms: u64,
}

impl TopicRouter {
    fn new(config: &Config) -> Self {
        Self {
            offers: config.offers_topic().to_string(),
            positions: config.positions_topic().to_string(),
            surge: config.surge_topic().to_string(),
            dispatch: config.dispatch_topic().to_string(),
            actions: config.actions_topic().to_string(),
            offer_window_ms: config.offer_window_ms(),
        }
    }

    /// Parse one publish into a session event.
    ///
    /// `None` means the topic is not one of ours; `Some(Err)` is a
    /// malformed payload on a routed topic.
    fn parse(
        &self,
        topic: &str,
        json_str: &str,
        now_ms: u64,
    ) -> Option<Result<TripEvent, serde_json::Error>> {
        if topic == self.offers {
            Some(parse_offer(json_str, now_ms, self.offer_window_ms))
        } else if topic == self.positions {
            Some(serde_json::from_str::<PositionSample>(json_str).map(TripEvent::Position))
        } else if topic == self.surge {
            Some(
                serde_json::from_str::<SurgeSnapshotMessage>(json_str)
                    .map(|msg| TripEvent::SurgeSnapshot(msg.zones)),
            )
        } else if topic == self.dispatch {
            Some(serde_json::from_str::<DispatchPush>(json_str).map(TripEvent::DispatchPush))
        } else if topic == self.actions {
            Some(serde_json::from_str::<DriverAction>(json_str).map(TripEvent::DriverAction))
        } else {
            None
        }
    }
}

/// Parse an offer payload, resolving its deadline against `now_ms`
fn parse_offer(
    json_str: &str,
    now_ms: u64,
    default_window_ms: u64,
) -> Result<TripEvent, serde_json::Error> {
    let msg: OfferMessage = serde_json::from_str(json_str)?;
    Ok(TripEvent::OfferReceived(RideOffer::from_message(
        msg,
        now_ms,
        default_window_ms,
    )))
}

/// Start the MQTT client and send parsed events to the session channel
///
/// Events are sent via try_send to avoid blocking the MQTT eventloop.
/// Dropped events are counted in metrics and logged (rate-limited).
/// Dispatch-critical topics subscribe at QoS 1; position and surge
/// streams at QoS 0 since a lost sample is replaced by the next one.
pub async fn start_mqtt_client(
    config: &Config,
    event_tx: mpsc::Sender<TripEvent>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let client_id = format!("trip-core-{}", config.driver_id());
    let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    // Set credentials if configured
    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqttoptions.set_credentials(username, password);
    }

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);
    client.subscribe(config.offers_topic(), QoS::AtLeastOnce).await?;
    client.subscribe(config.dispatch_topic(), QoS::AtLeastOnce).await?;
    client.subscribe(config.actions_topic(), QoS::AtLeastOnce).await?;
    client.subscribe(config.positions_topic(), QoS::AtMostOnce).await?;
    client.subscribe(config.surge_topic(), QoS::AtMostOnce).await?;

    info!(host = %config.mqtt_host(), port = %config.mqtt_port(), "MQTT client subscribed");

    let router = TopicRouter::new(config);

    // Rate-limit drop warnings to 1 per second
    let mut last_drop_warn = Instant::now() - Duration::from_secs(2);

    loop {
        tokio::select! {
            // Check for shutdown signal
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("mqtt_shutdown");
                    return Ok(());
                }
            }
            // Process MQTT events
            result = eventloop.poll() => {
                match result {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let topic = &publish.topic;

                        match std::str::from_utf8(&publish.payload) {
                            Ok(json_str) => match router.parse(topic, json_str, epoch_ms()) {
                                Some(Ok(event)) => {
                                    debug!(topic = %topic, kind = event.kind(), "ingress_message");
                                    if let Err(e) = event_tx.try_send(event) {
                                        match e {
                                            TrySendError::Full(_) => {
                                                metrics.record_ingress_dropped();
                                                if last_drop_warn.elapsed() > Duration::from_secs(1) {
                                                    warn!("ingress_dropped: channel full");
                                                    last_drop_warn = Instant::now();
                                                }
                                            }
                                            TrySendError::Closed(_) => {
                                                warn!("Event channel closed");
                                                return Ok(());
                                            }
                                        }
                                    }
                                }
                                Some(Err(e)) => {
                                    metrics.record_parse_failure();
                                    warn!(topic = %topic, error = %e, "ingress_parse_failed");
                                }
                                None => {
                                    debug!(topic = %topic, "ingress_unrouted_topic");
                                }
                            },
                            Err(e) => {
                                metrics.record_parse_failure();
                                warn!(error = %e, "Invalid UTF-8 in MQTT payload");
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("MQTT connected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "MQTT error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}
