//! Trip session - the single-consumer event loop for the active trip
//!
//! The TripSession is the central event processor that coordinates:
//! - Offer presentation and the time-boxed accept/decline window
//! - Trip lifecycle (arrival, wait billing, start, completion, cancel)
//! - Route enrichment, position snapping and the location beacon
//! - Surge board updates and display egress
//!
//! All trip state mutates here and nowhere else. External inputs arrive
//! on one typed channel; a single 1 Hz tick drives both the offer
//! countdown and the wait accrual.

mod handlers;
#[cfg(test)]
mod tests;

use crate::domain::trip::{epoch_ms, TripStatus};
use crate::domain::types::TripEvent;
use crate::infra::config::Config;
use crate::infra::metrics::{
    Metrics, TRIP_STATE_AT_PICKUP, TRIP_STATE_EN_ROUTE, TRIP_STATE_IDLE, TRIP_STATE_IN_TRIP,
};
use crate::io::archive::TripArchive;
use crate::io::egress_channel::{EgressSender, PingThrottle, WaitUpdatePayload};
use crate::io::routing::RouteClient;
use crate::io::snapshot::SnapshotStore;
use crate::services::offer::{DeclineKind, OfferController, OfferTick};
use crate::services::surge::SurgeBoard;
use crate::services::trip_machine::TripMachine;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration};
use tracing::{info, warn};

/// Map a trip status onto the Prometheus state gauge
fn trip_state_gauge(status: TripStatus) -> u64 {
    match status {
        TripStatus::EnRouteToPickup => TRIP_STATE_EN_ROUTE,
        TripStatus::AtPickup => TRIP_STATE_AT_PICKUP,
        TripStatus::InTrip => TRIP_STATE_IN_TRIP,
        TripStatus::Completed | TripStatus::Cancelled => TRIP_STATE_IDLE,
    }
}

/// Central event processor for the driver's active trip
pub struct TripSession {
    /// Pending offer and its countdown
    pub(crate) offers: OfferController,
    /// The active trip with its side state, if any
    pub(crate) machine: Option<TripMachine>,
    /// Current surge picture
    pub(crate) surge: SurgeBoard,
    /// Rate and distance gate for outbound location pings
    pub(crate) throttle: PingThrottle,
    /// Appends finished trips to the archive file
    pub(crate) archive: TripArchive,
    /// Persists the active trip for restart recovery
    pub(crate) snapshots: SnapshotStore,
    /// Application configuration
    pub(crate) config: Config,
    /// Routing service client for route enrichment
    pub(crate) routes: Arc<dyn RouteClient>,
    /// Metrics collector
    pub(crate) metrics: Arc<Metrics>,
    /// MQTT egress sender
    pub(crate) egress: EgressSender,
    /// Loopback sender so spawned route fetches post back into the queue
    pub(crate) events_tx: mpsc::Sender<TripEvent>,
    /// One route request per pickup leg per trip
    pub(crate) pickup_route_requested: bool,
    /// One route request per trip leg per trip
    pub(crate) trip_route_requested: bool,
}

impl TripSession {
    /// Create a new session with the given configuration and dependencies
    pub fn new(
        config: Config,
        routes: Arc<dyn RouteClient>,
        metrics: Arc<Metrics>,
        egress: EgressSender,
        events_tx: mpsc::Sender<TripEvent>,
    ) -> Self {
        let archive = TripArchive::new(config.archive_file());
        let snapshots = SnapshotStore::new(config.snapshot_file());
        let surge = SurgeBoard::new(config.surge_tuning());
        let throttle = PingThrottle::new(config.ping_min_interval_ms(), config.ping_min_move_m());
        Self {
            offers: OfferController::new(),
            machine: None,
            surge,
            throttle,
            archive,
            snapshots,
            config,
            routes,
            metrics,
            egress,
            events_tx,
            pickup_route_requested: false,
            trip_route_requested: false,
        }
    }

    /// Reload a persisted active trip after a restart.
    ///
    /// Terminal snapshots are discarded. Routes are not persisted, so
    /// the active leg is re-requested (the pickup leg waits for the
    /// first position fix).
    pub fn rehydrate(&mut self) {
        let Some(trip) = self.snapshots.load() else {
            return;
        };
        if trip.status.is_terminal() {
            self.snapshots.clear();
            return;
        }

        let now_ms = epoch_ms();
        let machine = TripMachine::resume(trip, now_ms, self.config.trip_tuning());
        self.metrics.set_trip_state(trip_state_gauge(machine.status()));
        self.machine = Some(machine);
        self.maybe_request_routes();
    }

    /// Start the session, consuming events from the channel.
    ///
    /// Runs until the channel closes or the shutdown signal fires, then
    /// tears down: a pending offer is abandoned to its server-side
    /// timeout and an active trip is snapshotted for rehydration.
    pub async fn run(
        &mut self,
        mut events_rx: mpsc::Receiver<TripEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        // One 1 Hz tick drives both the offer countdown and wait accrual
        let mut tick_interval = interval(Duration::from_secs(1));

        loop {
            tokio::select! {
                event = events_rx.recv() => {
                    match event {
                        Some(e) => self.process_event(e),
                        None => break, // Channel closed
                    }
                }
                _ = tick_interval.tick() => {
                    self.metrics.set_event_queue_depth(events_rx.len() as u64);
                    self.tick_at(epoch_ms());
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.teardown();
    }

    /// Process a single event, dispatching to the appropriate handler
    pub fn process_event(&mut self, event: TripEvent) {
        let process_start = Instant::now();

        self.process_event_at(event, epoch_ms());

        // Record processing latency (lock-free)
        let latency_us = process_start.elapsed().as_micros() as u64;
        self.metrics.record_event_processed(latency_us);
    }

    /// Clock-parameterized core so tests can drive time explicitly
    pub(crate) fn process_event_at(&mut self, event: TripEvent, now_ms: u64) {
        match event {
            TripEvent::OfferReceived(offer) => self.handle_offer(offer, now_ms),
            TripEvent::Position(sample) => self.handle_position(sample, now_ms),
            TripEvent::SurgeSnapshot(zones) => self.handle_surge(zones, now_ms),
            TripEvent::DriverAction(action) => self.handle_driver_action(action, now_ms),
            TripEvent::DispatchPush(push) => self.handle_dispatch_push(push, now_ms),
            TripEvent::RouteReady { trip_id, leg, plan } => {
                self.handle_route_ready(trip_id, leg, plan)
            }
            TripEvent::RouteFailed { trip_id, leg } => self.handle_route_failed(trip_id, leg),
        }
    }

    /// 1 Hz step: offer countdown/auto-decline and wait accrual
    pub(crate) fn tick_at(&mut self, now_ms: u64) {
        match self.offers.tick(now_ms) {
            Some(OfferTick::Countdown { offer_id, remaining_s }) => {
                self.send_countdown(&offer_id, remaining_s, now_ms);
            }
            Some(OfferTick::AutoDeclined(offer)) => {
                self.metrics.record_offer_declined(true);
                self.metrics.set_offer_pending(false);
                self.send_decline(&offer, DeclineKind::AutoTimeout, None, now_ms);
            }
            None => {}
        }

        let wait = self.machine.as_mut().and_then(|m| m.tick(now_ms));
        if let Some(wait) = wait {
            if wait.grace_just_exceeded {
                self.metrics.record_wait_grace_exceeded();
            }
            let trip_id = match self.machine.as_ref() {
                Some(machine) => machine.trip_id().0.clone(),
                None => return,
            };
            self.egress.send_wait_update(WaitUpdatePayload::from_snapshot(
                trip_id,
                wait.snapshot,
                now_ms,
            ));
        }
    }

    /// Release session state on shutdown
    fn teardown(&mut self) {
        if let Some(offer) = self.offers.clear() {
            // Dispatch times the offer out server-side
            warn!(offer_id = %offer.id, "offer_abandoned_on_shutdown");
            self.metrics.set_offer_pending(false);
        }

        if let Some(machine) = self.machine.as_ref() {
            if !machine.is_terminal() {
                self.snapshots.save(machine.trip());
                info!(
                    trip_id = %machine.trip_id(),
                    status = %machine.status().as_str(),
                    "trip_snapshot_on_shutdown"
                );
            }
        }

        info!("session_closed");
    }

    /// Get the active trip status, if any
    #[allow(dead_code)]
    pub fn trip_status(&self) -> Option<TripStatus> {
        self.machine.as_ref().map(|m| m.status())
    }

    /// Whether an offer is awaiting a decision
    #[allow(dead_code)]
    pub fn offer_pending(&self) -> bool {
        self.offers.pending().is_some()
    }
}
