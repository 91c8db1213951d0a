//! Typed channel for MQTT egress messages
//!
//! Provides a non-blocking way to send events to the MQTT publisher.
//! Uses bounded mpsc channels to prevent unbounded memory growth.

use crate::domain::types::Coordinate;
use crate::geo::distance_meters;
use crate::services::surge::{Hotspot, ZoneLabel};
use crate::services::wait_billing::WaitSnapshot;
use serde::Serialize;
use tokio::sync::mpsc;

/// Messages that can be sent to the MQTT publisher
#[derive(Debug)]
pub enum EgressMessage {
    /// Offer accepted or declined (dispatch decision)
    OfferDecision(OfferDecisionPayload),
    /// Trip status change
    TripStatus(TripStatusPayload),
    /// Per-second countdown for a pending offer
    OfferCountdown(OfferCountdownPayload),
    /// Per-second wait time update while at the pickup
    WaitUpdate(WaitUpdatePayload),
    /// Throttled driver position beacon
    LocationPing(LocationPingPayload),
    /// Destination geofence entered or left
    DestinationFence(DestinationFencePayload),
    /// Surge hotspots and labels derived from the latest zone snapshot
    SurgeView(SurgeViewPayload),
}

/// Payload for offer accept/decline decisions
#[derive(Debug, Clone, Serialize)]
pub struct OfferDecisionPayload {
    /// Driver identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// Decision type (accepted, declined)
    pub t: String,
    /// Offer ID the decision applies to
    pub offer_id: String,
    /// Trip ID created by an accept
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trip_id: Option<String>,
    /// Decline reason (driver, auto_timeout, driver_busy)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Free-form driver note on a decline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Timestamp (epoch ms)
    pub ts: u64,
}

/// Payload for trip status changes
#[derive(Debug, Clone, Serialize)]
pub struct TripStatusPayload {
    /// Driver identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// Trip ID
    pub trip_id: String,
    /// New status (en_route_to_pickup, at_pickup, in_trip, completed, cancelled)
    pub status: String,
    /// Timestamp (epoch ms)
    pub ts: u64,
    /// Wait charge frozen at trip start
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_charge_usd: Option<f64>,
    /// Base fare (on completion)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fare_base_usd: Option<f64>,
    /// Total fare including wait charge (on completion)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fare_total_usd: Option<f64>,
    /// Cancelling party (on cancellation)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_by: Option<String>,
}

/// Payload for offer countdown display updates
#[derive(Debug, Clone, Serialize)]
pub struct OfferCountdownPayload {
    /// Driver identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// Offer ID
    pub offer_id: String,
    /// Whole seconds remaining in the decision window
    pub remaining_s: u64,
    /// Timestamp (epoch ms)
    pub ts: u64,
}

/// Payload for wait time display updates
#[derive(Debug, Clone, Serialize)]
pub struct WaitUpdatePayload {
    /// Driver identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// Trip ID
    pub trip_id: String,
    /// Whole seconds waited since arrival
    pub waited_s: u64,
    /// Whole seconds past the grace period
    pub billable_s: u64,
    /// Accumulated wait charge
    pub charge_usd: f64,
    /// True while still inside the free grace period
    pub in_grace: bool,
    /// Timestamp (epoch ms)
    pub ts: u64,
}

impl WaitUpdatePayload {
    /// Build a display update from a billing snapshot
    pub fn from_snapshot(trip_id: String, snapshot: WaitSnapshot, ts: u64) -> Self {
        Self {
            driver: None,
            trip_id,
            waited_s: snapshot.waited_secs(),
            billable_s: snapshot.billable_secs(),
            charge_usd: snapshot.charge_usd,
            in_grace: snapshot.in_grace(),
            ts,
        }
    }
}

/// Payload for throttled driver position beacons
#[derive(Debug, Clone, Serialize)]
pub struct LocationPingPayload {
    /// Driver identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// Latitude in decimal degrees
    pub lat: f64,
    /// Longitude in decimal degrees
    pub lng: f64,
    /// Active trip ID, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trip_id: Option<String>,
    /// Timestamp (epoch ms)
    pub ts: u64,
}

/// Payload for destination geofence changes
#[derive(Debug, Clone, Serialize)]
pub struct DestinationFencePayload {
    /// Driver identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// Trip ID
    pub trip_id: String,
    /// True when inside the destination radius
    pub reached: bool,
    /// Timestamp (epoch ms)
    pub ts: u64,
}

/// One hotspot marker in a surge view
#[derive(Debug, Clone, Serialize)]
pub struct HotspotView {
    /// Marker latitude (weighted centroid)
    pub lat: f64,
    /// Marker longitude (weighted centroid)
    pub lng: f64,
    /// Displayed multiplier (strongest member)
    pub multiplier: f64,
    /// Zone IDs merged into this marker, strongest first
    pub zone_ids: Vec<String>,
}

impl From<&Hotspot> for HotspotView {
    fn from(h: &Hotspot) -> Self {
        Self {
            lat: h.center.lat,
            lng: h.center.lng,
            multiplier: h.multiplier,
            zone_ids: h.zone_ids.clone(),
        }
    }
}

/// One text label in a surge view
#[derive(Debug, Clone, Serialize)]
pub struct LabelView {
    /// Zone ID the label belongs to
    pub zone_id: String,
    /// Short display code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Label latitude
    pub lat: f64,
    /// Label longitude
    pub lng: f64,
    /// Zone multiplier
    pub multiplier: f64,
    /// Zone kind (airport, general)
    pub kind: String,
}

impl From<&ZoneLabel> for LabelView {
    fn from(l: &ZoneLabel) -> Self {
        Self {
            zone_id: l.zone_id.clone(),
            code: l.code.clone(),
            lat: l.center.lat,
            lng: l.center.lng,
            multiplier: l.multiplier,
            kind: l.kind.as_str().to_string(),
        }
    }
}

/// Payload for the rendered surge view
#[derive(Debug, Clone, Serialize)]
pub struct SurgeViewPayload {
    /// Driver identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// Timestamp (epoch ms)
    pub ts: u64,
    /// Merged hotspot markers
    pub hotspots: Vec<HotspotView>,
    /// Spaced text labels
    pub labels: Vec<LabelView>,
}

/// Sender handle for egress messages
///
/// Clone this to share across multiple producers.
/// Non-blocking - if the channel is full, messages are dropped.
#[derive(Clone)]
pub struct EgressSender {
    tx: mpsc::Sender<EgressMessage>,
    driver_id: String,
}

impl EgressSender {
    /// Create a new sender from an mpsc sender
    pub fn new(tx: mpsc::Sender<EgressMessage>, driver_id: String) -> Self {
        Self { tx, driver_id }
    }

    /// Send an offer decision
    /// Injects driver_id into the payload
    pub fn send_offer_decision(&self, mut payload: OfferDecisionPayload) {
        payload.driver = Some(self.driver_id.clone());
        // Use try_send to avoid blocking - drop if channel full
        let _ = self.tx.try_send(EgressMessage::OfferDecision(payload));
    }

    /// Send a trip status change
    /// Injects driver_id into the payload
    pub fn send_trip_status(&self, mut payload: TripStatusPayload) {
        payload.driver = Some(self.driver_id.clone());
        let _ = self.tx.try_send(EgressMessage::TripStatus(payload));
    }

    /// Send an offer countdown update
    /// Injects driver_id into the payload
    pub fn send_offer_countdown(&self, mut payload: OfferCountdownPayload) {
        payload.driver = Some(self.driver_id.clone());
        let _ = self.tx.try_send(EgressMessage::OfferCountdown(payload));
    }

    /// Send a wait time update
    /// Injects driver_id into the payload
    pub fn send_wait_update(&self, mut payload: WaitUpdatePayload) {
        payload.driver = Some(self.driver_id.clone());
        let _ = self.tx.try_send(EgressMessage::WaitUpdate(payload));
    }

    /// Send a throttled location ping
    /// Injects driver_id into the payload
    pub fn send_location_ping(&self, mut payload: LocationPingPayload) {
        payload.driver = Some(self.driver_id.clone());
        let _ = self.tx.try_send(EgressMessage::LocationPing(payload));
    }

    /// Send a destination geofence change
    /// Injects driver_id into the payload
    pub fn send_destination_fence(&self, mut payload: DestinationFencePayload) {
        payload.driver = Some(self.driver_id.clone());
        let _ = self.tx.try_send(EgressMessage::DestinationFence(payload));
    }

    /// Send a rendered surge view
    /// Injects driver_id into the payload
    pub fn send_surge_view(&self, mut payload: SurgeViewPayload) {
        payload.driver = Some(self.driver_id.clone());
        let _ = self.tx.try_send(EgressMessage::SurgeView(payload));
    }
}

/// Create a new egress channel pair
///
/// Returns (sender, receiver) where sender can be cloned and shared.
/// Buffer size determines how many messages can be queued.
/// driver_id is injected into every payload for downstream consumers.
pub fn create_egress_channel(
    buffer_size: usize,
    driver_id: String,
) -> (EgressSender, mpsc::Receiver<EgressMessage>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (EgressSender::new(tx, driver_id), rx)
}

/// Rate and distance gate for outbound location pings
///
/// Position samples arrive far faster than dispatch needs them. A ping
/// goes out only when the minimum interval has elapsed AND the driver has
/// moved at least the minimum distance since the last ping. The first
/// sample always passes.
pub struct PingThrottle {
    min_interval_ms: u64,
    min_move_m: f64,
    last_sent_ms: Option<u64>,
    last_coord: Option<Coordinate>,
}

impl PingThrottle {
    /// Create a throttle with the given interval and movement floors
    pub fn new(min_interval_ms: u64, min_move_m: f64) -> Self {
        Self {
            min_interval_ms,
            min_move_m,
            last_sent_ms: None,
            last_coord: None,
        }
    }

    /// Whether this sample should be forwarded; updates internal state when it is
    pub fn should_send(&mut self, coord: Coordinate, now_ms: u64) -> bool {
        if let Some(last_ms) = self.last_sent_ms {
            if now_ms.saturating_sub(last_ms) < self.min_interval_ms {
                return false;
            }
        }
        if let Some(last) = self.last_coord {
            if distance_meters(last, coord) < self.min_move_m {
                return false;
            }
        }
        self.last_sent_ms = Some(now_ms);
        self.last_coord = Some(coord);
        true
    }

    /// Forget the last ping so the next sample passes unconditionally
    pub fn reset(&mut self) {
        self.last_sent_ms = None;
        self.last_coord = None;
    }
}
