//! Tests for the trip session

use super::*;
use crate::domain::offer::RideOffer;
use crate::domain::trip::{RoutePlan, RouteSource, Trip};
use crate::domain::types::{
    Coordinate, DispatchPush, DriverAction, Location, OfferId, PositionSample, RiderSummary,
    RouteLeg, SurgeZone, TripId, ZoneKind,
};
use crate::geo::RoutePolyline;
use crate::io::egress_channel::{create_egress_channel, EgressMessage};
use crate::io::routing::MockRouteClient;
use tempfile::TempDir;

/// Test harness that keeps channel receivers alive so `try_send` succeeds
struct TestSession {
    session: TripSession,
    egress_rx: mpsc::Receiver<EgressMessage>,
    #[allow(dead_code)]
    events_rx: mpsc::Receiver<TripEvent>,
    dir: TempDir,
}

impl std::ops::Deref for TestSession {
    type Target = TripSession;
    fn deref(&self) -> &Self::Target {
        &self.session
    }
}

impl std::ops::DerefMut for TestSession {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.session
    }
}

impl TestSession {
    fn archive_path(&self) -> std::path::PathBuf {
        self.dir.path().join("trips.jsonl")
    }

    fn snapshot_path(&self) -> std::path::PathBuf {
        self.dir.path().join("active_trip.json")
    }

    fn drain_egress(&mut self) -> Vec<EgressMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.egress_rx.try_recv() {
            out.push(msg);
        }
        out
    }
}

/// Build a session whose persistence files live under `dir`
fn build_session(
    dir: &TempDir,
    config: Config,
) -> (TripSession, mpsc::Receiver<EgressMessage>, mpsc::Receiver<TripEvent>) {
    let archive = dir.path().join("trips.jsonl");
    let snapshot = dir.path().join("active_trip.json");
    let config =
        config.with_persist_files(archive.to_str().unwrap(), snapshot.to_str().unwrap());
    let (egress, egress_rx) = create_egress_channel(64, "driver-test".to_string());
    let (events_tx, events_rx) = mpsc::channel::<TripEvent>(64);
    let metrics = Arc::new(Metrics::new());
    let routes: Arc<dyn RouteClient> = Arc::new(MockRouteClient { plan: None });
    let session = TripSession::new(config, routes, metrics, egress, events_tx);
    (session, egress_rx, events_rx)
}

fn create_test_session() -> TestSession {
    create_test_session_with_config(Config::default().with_routing_enabled(false))
}

fn create_test_session_with_config(config: Config) -> TestSession {
    let dir = tempfile::tempdir().unwrap();
    let (session, egress_rx, events_rx) = build_session(&dir, config);
    TestSession { session, egress_rx, events_rx, dir }
}

fn offer(id: &str, expires_at_ms: u64) -> RideOffer {
    RideOffer {
        id: OfferId(id.to_string()),
        rider: RiderSummary { name: "Ana".to_string(), rating: 4.9, phone: None, photo_url: None },
        pickup: Location::new("100 Main St", 36.373, -94.209),
        destination: Location::new("200 Elm St", 36.385, -94.220),
        estimated_fare: 12.5,
        estimated_distance_miles: 3.2,
        estimated_duration_minutes: 11.0,
        surge_multiplier: 1.0,
        expires_at_ms,
    }
}

fn position(lat: f64, lng: f64) -> PositionSample {
    PositionSample { lat, lng, heading: None, speed_mps: None, ts: None }
}

fn zone(id: &str, lat: f64, lng: f64, multiplier: f64) -> SurgeZone {
    SurgeZone {
        id: id.to_string(),
        code: None,
        zone_type: ZoneKind::General,
        center: Coordinate { lat, lng },
        polygon: Vec::new(),
        multiplier,
        surge_amount: None,
    }
}

/// Present an offer and accept it, leaving the session en route to pickup
fn accept_offer(session: &mut TestSession, id: &str, now_ms: u64) {
    session.process_event_at(TripEvent::OfferReceived(offer(id, now_ms + 15_000)), now_ms);
    session.process_event_at(TripEvent::DriverAction(DriverAction::Accept), now_ms);
}

#[tokio::test]
async fn test_accept_creates_trip() {
    let mut session = create_test_session();
    session.process_event_at(TripEvent::OfferReceived(offer("of-1", 15_000)), 0);
    assert!(session.offers.pending().is_some());

    session.process_event_at(TripEvent::DriverAction(DriverAction::Accept), 1_000);

    assert!(session.offers.pending().is_none());
    assert_eq!(session.trip_status(), Some(TripStatus::EnRouteToPickup));
    // Snapshot written for restart recovery
    assert!(session.snapshot_path().exists());

    let messages = session.drain_egress();
    assert!(messages.iter().any(|m| matches!(m, EgressMessage::OfferCountdown(_))));
    assert!(messages.iter().any(|m| matches!(
        m,
        EgressMessage::OfferDecision(p) if p.t == "accepted" && p.trip_id.is_some()
    )));
    assert!(messages.iter().any(|m| matches!(
        m,
        EgressMessage::TripStatus(p) if p.status == "en_route_to_pickup"
    )));

    let summary = session.metrics.report();
    assert_eq!(summary.offers_received_total, 1);
    assert_eq!(summary.offers_accepted_total, 1);
    assert_eq!(summary.trip_state, TRIP_STATE_EN_ROUTE);
}

#[tokio::test]
async fn test_driver_decline_sends_reason_and_note() {
    let mut session = create_test_session();
    session.process_event_at(TripEvent::OfferReceived(offer("of-1", 15_000)), 0);
    session.process_event_at(
        TripEvent::DriverAction(DriverAction::Decline { reason: Some("too far".to_string()) }),
        2_000,
    );

    assert!(session.offers.pending().is_none());
    assert!(session.machine.is_none());

    let messages = session.drain_egress();
    assert!(messages.iter().any(|m| matches!(
        m,
        EgressMessage::OfferDecision(p)
            if p.t == "declined"
                && p.reason.as_deref() == Some("driver")
                && p.note.as_deref() == Some("too far")
    )));

    let summary = session.metrics.report();
    assert_eq!(summary.offers_declined_total, 1);
    assert_eq!(summary.offers_auto_declined_total, 0);
}

#[tokio::test]
async fn test_offer_auto_declines_after_window() {
    let mut session = create_test_session();
    session.process_event_at(TripEvent::OfferReceived(offer("of-1", 15_000)), 0);

    // 1 Hz ticks through and past the decision window
    for s in 1..=16u64 {
        session.tick_at(s * 1_000);
    }

    assert!(session.offers.pending().is_none());
    let messages = session.drain_egress();
    assert!(messages.iter().any(|m| matches!(
        m,
        EgressMessage::OfferDecision(p)
            if p.t == "declined" && p.reason.as_deref() == Some("auto_timeout")
    )));

    let summary = session.metrics.report();
    assert_eq!(summary.offers_auto_declined_total, 1);
    assert_eq!(summary.offer_pending, 0);
}

#[tokio::test]
async fn test_expired_offer_cannot_be_accepted() {
    let mut session = create_test_session();
    session.process_event_at(TripEvent::OfferReceived(offer("of-1", 15_000)), 0);

    // Driver taps accept after the window closed
    session.process_event_at(TripEvent::DriverAction(DriverAction::Accept), 16_000);
    assert!(session.machine.is_none());

    // The next tick resolves the offer as an auto-decline
    session.tick_at(17_000);
    assert!(session.offers.pending().is_none());

    let summary = session.metrics.report();
    assert_eq!(summary.offers_auto_declined_total, 1);
    assert_eq!(summary.offers_accepted_total, 0);
}

#[tokio::test]
async fn test_second_offer_replaces_pending() {
    let mut session = create_test_session();
    session.process_event_at(TripEvent::OfferReceived(offer("of-1", 15_000)), 0);
    session.drain_egress();

    session.process_event_at(TripEvent::OfferReceived(offer("of-2", 16_000)), 1_000);

    // The newcomer owns the slot; of-1's countdown is gone
    assert_eq!(session.offers.pending().unwrap().id, OfferId("of-2".to_string()));

    let messages = session.drain_egress();
    // No decision goes out for the displaced offer
    assert!(!messages.iter().any(|m| matches!(m, EgressMessage::OfferDecision(_))));
    assert!(messages.iter().any(|m| matches!(
        m,
        EgressMessage::OfferCountdown(p) if p.offer_id == "of-2" && p.remaining_s == 15
    )));

    // Accepting resolves the replacement, not the displaced offer
    session.process_event_at(TripEvent::DriverAction(DriverAction::Accept), 2_000);
    assert_eq!(session.trip_status(), Some(TripStatus::EnRouteToPickup));
    let accepted = session
        .drain_egress()
        .into_iter()
        .find_map(|m| match m {
            EgressMessage::OfferDecision(p) if p.t == "accepted" => Some(p),
            _ => None,
        })
        .expect("accept decision");
    assert_eq!(accepted.offer_id, "of-2");

    let summary = session.metrics.report();
    assert_eq!(summary.offers_superseded_total, 1);
    assert_eq!(summary.offers_declined_total, 0);
}

#[tokio::test]
async fn test_offer_during_active_trip_is_busy_declined() {
    let mut session = create_test_session();
    accept_offer(&mut session, "of-1", 0);
    session.drain_egress();

    session.process_event_at(TripEvent::OfferReceived(offer("of-2", 60_000)), 5_000);

    assert!(session.offers.pending().is_none());
    assert_eq!(session.trip_status(), Some(TripStatus::EnRouteToPickup));

    let messages = session.drain_egress();
    assert!(messages.iter().any(|m| matches!(
        m,
        EgressMessage::OfferDecision(p)
            if p.offer_id == "of-2" && p.reason.as_deref() == Some("driver_busy")
    )));
}

#[tokio::test]
async fn test_geofence_arrival_starts_wait_billing() {
    let mut session = create_test_session();
    accept_offer(&mut session, "of-1", 0);
    session.drain_egress();

    // Well outside the 100 m pickup radius
    session.process_event_at(TripEvent::Position(position(36.390, -94.209)), 10_000);
    assert_eq!(session.trip_status(), Some(TripStatus::EnRouteToPickup));

    // Inside the radius: the arrival one-shot fires
    session.process_event_at(TripEvent::Position(position(36.3731, -94.2091)), 120_000);
    assert_eq!(session.trip_status(), Some(TripStatus::AtPickup));
    session.drain_egress();

    // Wait updates ride the 1 Hz tick; inside the 120 s grace there is no charge
    session.tick_at(121_000);
    let wait = session
        .drain_egress()
        .into_iter()
        .find_map(|m| match m {
            EgressMessage::WaitUpdate(p) => Some(p),
            _ => None,
        })
        .expect("wait update after arrival");
    assert_eq!(wait.waited_s, 1);
    assert!(wait.in_grace);
    assert_eq!(wait.charge_usd, 0.0);

    // Past the grace the charge accrues and the metric fires exactly once
    session.tick_at(241_000);
    session.tick_at(242_000);
    let wait = session
        .drain_egress()
        .into_iter()
        .rev()
        .find_map(|m| match m {
            EgressMessage::WaitUpdate(p) => Some(p),
            _ => None,
        })
        .expect("wait update past grace");
    assert_eq!(wait.waited_s, 122);
    assert_eq!(wait.billable_s, 2);
    assert!(!wait.in_grace);
    assert!(wait.charge_usd > 0.0);

    let summary = session.metrics.report();
    assert_eq!(summary.wait_grace_exceeded_total, 1);
    assert_eq!(summary.trip_state, TRIP_STATE_AT_PICKUP);
}

#[tokio::test]
async fn test_completed_trip_is_archived_and_reset() {
    let mut session = create_test_session();
    accept_offer(&mut session, "of-1", 0);
    session.process_event_at(TripEvent::DriverAction(DriverAction::Arrived), 60_000);
    // 140 s at the pickup leaves 20 billable seconds
    session.process_event_at(TripEvent::DriverAction(DriverAction::StartTrip), 200_000);
    assert_eq!(session.trip_status(), Some(TripStatus::InTrip));
    session.drain_egress();

    session.process_event_at(TripEvent::DriverAction(DriverAction::CompleteTrip), 900_000);

    // Session state is reset for the next offer
    assert!(session.machine.is_none());
    assert!(!session.snapshot_path().exists());

    // The finished trip landed in the archive with the wait charge folded in
    let content = std::fs::read_to_string(session.archive_path()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
    assert_eq!(parsed["status"], "completed");
    assert!(parsed["wait_charge_usd"].as_f64().unwrap() > 0.11);
    assert!(parsed["fare"]["total_usd"].as_f64().unwrap() > 12.61);

    let messages = session.drain_egress();
    assert!(messages.iter().any(|m| matches!(
        m,
        EgressMessage::TripStatus(p) if p.status == "completed" && p.fare_total_usd.is_some()
    )));

    let summary = session.metrics.report();
    assert_eq!(summary.trips_completed_total, 1);
    assert_eq!(summary.trip_state, TRIP_STATE_IDLE);
}

#[tokio::test]
async fn test_driver_cancel_archives_with_reason() {
    let mut session = create_test_session();
    accept_offer(&mut session, "of-1", 0);
    session.drain_egress();

    session.process_event_at(
        TripEvent::DriverAction(DriverAction::Cancel { reason: Some("rider no-show".to_string()) }),
        300_000,
    );

    assert!(session.machine.is_none());
    let content = std::fs::read_to_string(session.archive_path()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
    assert_eq!(parsed["status"], "cancelled");
    assert_eq!(parsed["cancel_reason"]["by"], "driver");
    assert_eq!(parsed["cancel_reason"]["note"], "rider no-show");

    let messages = session.drain_egress();
    assert!(messages.iter().any(|m| matches!(
        m,
        EgressMessage::TripStatus(p)
            if p.status == "cancelled" && p.cancelled_by.as_deref() == Some("driver")
    )));

    let summary = session.metrics.report();
    assert_eq!(summary.trips_cancelled_total, 1);
}

#[tokio::test]
async fn test_rider_cancellation_ends_trip() {
    let mut session = create_test_session();
    accept_offer(&mut session, "of-1", 0);
    let trip_id = session.machine.as_ref().unwrap().trip_id().0.clone();
    session.drain_egress();

    // A push naming some other trip is stale and ignored
    session.process_event_at(
        TripEvent::DispatchPush(DispatchPush::RiderCancelled {
            trip_id: Some("trip-other".to_string()),
            reason: None,
        }),
        5_000,
    );
    assert_eq!(session.trip_status(), Some(TripStatus::EnRouteToPickup));

    // The matching push cancels
    session.process_event_at(
        TripEvent::DispatchPush(DispatchPush::RiderCancelled {
            trip_id: Some(trip_id),
            reason: Some("changed plans".to_string()),
        }),
        6_000,
    );

    assert!(session.machine.is_none());
    let messages = session.drain_egress();
    assert!(messages.iter().any(|m| matches!(
        m,
        EgressMessage::TripStatus(p)
            if p.status == "cancelled" && p.cancelled_by.as_deref() == Some("rider")
    )));

    let content = std::fs::read_to_string(session.archive_path()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
    assert_eq!(parsed["cancel_reason"]["by"], "rider");

    let summary = session.metrics.report();
    assert_eq!(summary.trips_cancelled_total, 1);
}

#[tokio::test]
async fn test_pickup_route_waits_for_first_fix() {
    let mut session = create_test_session();
    accept_offer(&mut session, "of-1", 0);

    // No fix yet: nothing to route from
    assert!(!session.pickup_route_requested);
    assert!(session.machine.as_ref().unwrap().route(RouteLeg::Pickup).is_none());

    session.process_event_at(TripEvent::Position(position(36.380, -94.209)), 1_000);

    // Routing is disabled in tests, so the straight-line estimate attaches
    assert!(session.pickup_route_requested);
    let machine = session.machine.as_ref().unwrap();
    let plan = machine.route(RouteLeg::Pickup).unwrap();
    assert_eq!(plan.source, RouteSource::StraightLine);
    assert!(plan.distance_miles > 0.0);

    let summary = session.metrics.report();
    assert_eq!(summary.route_fallbacks_total, 1);
}

#[tokio::test]
async fn test_trip_leg_route_requested_at_start() {
    let mut session = create_test_session();
    accept_offer(&mut session, "of-1", 0);
    session.process_event_at(TripEvent::DriverAction(DriverAction::Arrived), 60_000);
    assert!(!session.trip_route_requested);

    session.process_event_at(TripEvent::DriverAction(DriverAction::StartTrip), 120_000);

    assert!(session.trip_route_requested);
    let plan = session.machine.as_ref().unwrap().route(RouteLeg::Trip).unwrap();
    assert_eq!(plan.source, RouteSource::StraightLine);
    assert!(plan.distance_miles > 0.0);
}

#[tokio::test]
async fn test_fetched_route_drives_snapping() {
    let mut session = create_test_session();
    accept_offer(&mut session, "of-1", 0);
    let trip_id = session.machine.as_ref().unwrap().trip_id().clone();

    // First fix requests the pickup route
    session.process_event_at(TripEvent::Position(position(36.380, -94.209)), 1_000);
    assert!(session.pickup_route_requested);

    // Fetch outcome arrives with a route straight down the street
    let plan = RoutePlan {
        polyline: RoutePolyline::new(vec![
            Coordinate { lat: 36.380, lng: -94.209 },
            Coordinate { lat: 36.376, lng: -94.209 },
            Coordinate { lat: 36.373, lng: -94.209 },
        ]),
        distance_miles: 0.5,
        duration_minutes: 2.0,
        source: RouteSource::Service,
    };
    session.process_event_at(TripEvent::RouteReady { trip_id, leg: RouteLeg::Pickup, plan }, 2_000);
    assert_eq!(
        session.machine.as_ref().unwrap().route(RouteLeg::Pickup).unwrap().source,
        RouteSource::Service
    );

    // On the corridor: no off-route count
    session.process_event_at(TripEvent::Position(position(36.378, -94.209)), 3_000);
    // ~800 m east of it: off-route
    session.process_event_at(TripEvent::Position(position(36.378, -94.200)), 4_500);

    let summary = session.metrics.report();
    assert_eq!(summary.routes_fetched_total, 1);
    assert_eq!(summary.off_route_total, 1);
}

#[tokio::test]
async fn test_failed_route_fetch_uses_fallback() {
    let mut session = create_test_session();
    accept_offer(&mut session, "of-1", 0);
    let trip_id = session.machine.as_ref().unwrap().trip_id().clone();
    session.process_event_at(TripEvent::Position(position(36.380, -94.209)), 1_000);

    session.process_event_at(TripEvent::RouteFailed { trip_id, leg: RouteLeg::Pickup }, 2_000);

    let plan = session.machine.as_ref().unwrap().route(RouteLeg::Pickup).unwrap();
    assert_eq!(plan.source, RouteSource::StraightLine);
    assert!(!plan.polyline.is_empty());

    let summary = session.metrics.report();
    // One fallback from the disabled routing path, one from the failed fetch
    assert_eq!(summary.route_fallbacks_total, 2);
}

#[tokio::test]
async fn test_stale_route_outcome_is_dropped() {
    let mut session = create_test_session();
    accept_offer(&mut session, "of-1", 0);

    let plan = RoutePlan {
        polyline: RoutePolyline::new(vec![
            Coordinate { lat: 36.380, lng: -94.209 },
            Coordinate { lat: 36.373, lng: -94.209 },
        ]),
        distance_miles: 0.5,
        duration_minutes: 2.0,
        source: RouteSource::Service,
    };
    session.process_event_at(
        TripEvent::RouteReady {
            trip_id: TripId("trip-other".to_string()),
            leg: RouteLeg::Pickup,
            plan,
        },
        1_000,
    );

    assert!(session.machine.as_ref().unwrap().route(RouteLeg::Pickup).is_none());
    assert_eq!(session.metrics.report().routes_fetched_total, 0);
}

#[tokio::test]
async fn test_surge_snapshot_renders_view() {
    let mut session = create_test_session();

    let zones = vec![
        zone("z1", 36.373, -94.209, 1.8),
        // Within the merge epsilon of z1
        zone("z2", 36.3735, -94.2095, 1.6),
        // Below both the hotspot and label floors
        zone("z3", 36.340, -94.180, 1.2),
        // Non-finite multiplier is dropped
        zone("z4", 36.350, -94.150, f64::NAN),
    ];
    session.process_event_at(TripEvent::SurgeSnapshot(zones), 1_000);

    let view = session
        .drain_egress()
        .into_iter()
        .find_map(|m| match m {
            EgressMessage::SurgeView(p) => Some(p),
            _ => None,
        })
        .expect("surge view");

    assert_eq!(view.hotspots.len(), 1);
    assert_eq!(view.hotspots[0].zone_ids.len(), 2);
    // z2 sits too close to the stronger z1 to get its own label
    assert_eq!(view.labels.len(), 1);
    assert_eq!(view.labels[0].zone_id, "z1");

    let summary = session.metrics.report();
    assert_eq!(summary.surge_snapshots_total, 1);
    assert_eq!(summary.surge_zones_dropped_total, 1);
}

#[tokio::test]
async fn test_location_pings_are_throttled() {
    let mut session = create_test_session();

    session.process_event_at(TripEvent::Position(position(36.373, -94.209)), 1_000);
    // 400 ms later: under the interval floor
    session.process_event_at(TripEvent::Position(position(36.374, -94.209)), 1_400);
    // Past the interval and moved far enough
    session.process_event_at(TripEvent::Position(position(36.375, -94.209)), 2_500);

    let pings = session
        .drain_egress()
        .into_iter()
        .filter(|m| matches!(m, EgressMessage::LocationPing(_)))
        .count();
    assert_eq!(pings, 2);

    let summary = session.metrics.report();
    assert_eq!(summary.positions_total, 3);
    assert_eq!(summary.location_pings_total, 2);
}

#[tokio::test]
async fn test_destination_fence_does_not_complete_trip() {
    let mut session = create_test_session();
    accept_offer(&mut session, "of-1", 0);
    session.process_event_at(TripEvent::DriverAction(DriverAction::Arrived), 10_000);
    session.process_event_at(TripEvent::DriverAction(DriverAction::StartTrip), 20_000);
    session.drain_egress();

    // Entering the destination radius only flips the fence flag
    session.process_event_at(TripEvent::Position(position(36.385, -94.220)), 30_000);
    assert_eq!(session.trip_status(), Some(TripStatus::InTrip));

    let messages = session.drain_egress();
    assert!(messages.iter().any(|m| matches!(
        m,
        EgressMessage::DestinationFence(p) if p.reached
    )));

    // Completion happens only on the driver's confirmation
    session.process_event_at(TripEvent::DriverAction(DriverAction::CompleteTrip), 40_000);
    assert!(session.machine.is_none());
    assert_eq!(session.metrics.report().trips_completed_total, 1);
}

#[tokio::test]
async fn test_action_without_trip_is_rejected() {
    let mut session = create_test_session();
    session.process_event_at(TripEvent::DriverAction(DriverAction::Arrived), 1_000);
    session.process_event_at(TripEvent::DriverAction(DriverAction::CompleteTrip), 2_000);
    session.process_event_at(TripEvent::DriverAction(DriverAction::Accept), 3_000);

    assert!(session.machine.is_none());
    assert!(session.drain_egress().is_empty());

    let summary = session.metrics.report();
    assert_eq!(summary.transitions_rejected_total, 3);
}

#[tokio::test]
async fn test_snapshot_rehydrates_after_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let (mut session, _egress_rx, _events_rx) =
            build_session(&dir, Config::default().with_routing_enabled(false));
        session.process_event_at(TripEvent::OfferReceived(offer("of-1", 15_000)), 0);
        session.process_event_at(TripEvent::DriverAction(DriverAction::Accept), 1_000);
        session.process_event_at(TripEvent::DriverAction(DriverAction::Arrived), 60_000);
    }

    // Fresh process: the snapshot brings the trip back mid-wait
    let (mut session, mut egress_rx, _events_rx) =
        build_session(&dir, Config::default().with_routing_enabled(false));
    session.rehydrate();

    assert_eq!(session.trip_status(), Some(TripStatus::AtPickup));
    assert_eq!(session.metrics.report().trip_state, TRIP_STATE_AT_PICKUP);

    // Wait billing resumes from the persisted arrival time
    session.tick_at(300_000);
    let mut wait = None;
    while let Ok(msg) = egress_rx.try_recv() {
        if let EgressMessage::WaitUpdate(p) = msg {
            wait = Some(p);
        }
    }
    let wait = wait.expect("wait update after rehydration");
    assert_eq!(wait.waited_s, 240);
    assert!(!wait.in_grace);
    assert!(wait.charge_usd > 0.0);
}

#[tokio::test]
async fn test_terminal_snapshot_is_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot_path = dir.path().join("active_trip.json");

    // A terminal trip left on disk (crash between archive and clear)
    let store = SnapshotStore::new(snapshot_path.to_str().unwrap());
    let mut trip = Trip::from_offer(offer("of-9", 15_000), 1_000);
    trip.transition(TripStatus::AtPickup, 2_000).unwrap();
    trip.transition(TripStatus::InTrip, 3_000).unwrap();
    trip.transition(TripStatus::Completed, 4_000).unwrap();
    store.save(&trip);

    let (mut session, _egress_rx, _events_rx) =
        build_session(&dir, Config::default().with_routing_enabled(false));
    session.rehydrate();

    assert!(session.machine.is_none());
    assert!(!snapshot_path.exists());
}

#[tokio::test]
async fn test_run_loop_shutdown_abandons_offer() {
    let mut harness = create_test_session();
    let (events_tx, events_rx) = mpsc::channel::<TripEvent>(16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    events_tx
        .send(TripEvent::OfferReceived(offer("of-1", epoch_ms() + 60_000)))
        .await
        .unwrap();

    let handle = tokio::spawn(async move {
        harness.run(events_rx, shutdown_rx).await;
        harness
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(true).unwrap();
    let harness = handle.await.unwrap();

    // The pending offer was abandoned to its server-side timeout
    assert!(harness.offers.pending().is_none());
    assert_eq!(harness.metrics.report().offer_pending, 0);
    assert_eq!(harness.metrics.report().offers_received_total, 1);
}
