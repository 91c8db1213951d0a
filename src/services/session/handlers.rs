//! Event handlers for the trip session
//!
//! Each inbound event type gets one handler. Handlers mutate session
//! state, bump metrics and push egress payloads; none of them block.

use crate::domain::offer::RideOffer;
use crate::domain::trip::{CancelReason, RoutePlan, TripStatus};
use crate::domain::types::{
    Coordinate, DispatchPush, DriverAction, OfferId, PositionSample, RouteLeg, SurgeZone, TripId,
};
use crate::geo::polyline::SnapResult;
use crate::infra::metrics::{
    TRIP_STATE_AT_PICKUP, TRIP_STATE_EN_ROUTE, TRIP_STATE_IDLE, TRIP_STATE_IN_TRIP,
};
use crate::io::egress_channel::{
    DestinationFencePayload, HotspotView, LabelView, LocationPingPayload, OfferCountdownPayload,
    OfferDecisionPayload, SurgeViewPayload, TripStatusPayload, WaitUpdatePayload,
};
use crate::io::routing::{fallback_plan, spawn_route_fetch};
use crate::services::offer::{DeclineKind, PresentOutcome};
use crate::services::session::TripSession;
use crate::services::trip_machine::TripMachine;
use tracing::{debug, info, warn};

impl TripSession {
    /// Handle an incoming ride offer.
    ///
    /// An active trip busy-declines the newcomer. Otherwise the offer
    /// is staged, displacing any pending offer along with its
    /// countdown, and the first countdown frame goes out with the
    /// presentation. A displaced offer gets no outbound decision;
    /// dispatch owns its resolution.
    pub(crate) fn handle_offer(&mut self, offer: RideOffer, now_ms: u64) {
        self.metrics.record_offer_received();

        if self.machine.as_ref().is_some_and(|m| !m.is_terminal()) {
            warn!(offer_id = %offer.id, "offer_during_active_trip");
            self.metrics.record_offer_declined(false);
            self.send_decline(&offer, DeclineKind::DriverBusy, None, now_ms);
            return;
        }

        let remaining_s = match self.offers.present(offer, now_ms) {
            PresentOutcome::Presented { remaining_s } => remaining_s,
            PresentOutcome::Replaced { remaining_s, superseded: _ } => {
                self.metrics.record_offer_superseded();
                remaining_s
            }
        };

        self.metrics.set_offer_pending(true);
        let offer_id = match self.offers.pending() {
            Some(pending) => pending.id.clone(),
            None => return,
        };
        self.send_countdown(&offer_id, remaining_s, now_ms);
    }

    /// Handle a position fix: throttled location beacon, then route
    /// snapping, the pickup arrival one-shot and destination proximity
    pub(crate) fn handle_position(&mut self, sample: PositionSample, now_ms: u64) {
        self.metrics.record_position();
        let coord = sample.coord();

        if self.throttle.should_send(coord, now_ms) {
            self.metrics.record_location_ping();
            let trip_id = self
                .machine
                .as_ref()
                .filter(|m| !m.is_terminal())
                .map(|m| m.trip_id().0.clone());
            self.egress.send_location_ping(LocationPingPayload {
                driver: None,
                lat: coord.lat,
                lng: coord.lng,
                trip_id,
                ts: now_ms,
            });
        }

        let (outcome, trip_id) = {
            let machine = match self.machine.as_mut() {
                Some(m) if !m.is_terminal() => m,
                _ => return,
            };
            let outcome = machine.on_position(coord, now_ms);
            (outcome, machine.trip_id().0.clone())
        };

        if let Some(SnapResult::OffRoute { closest_m }) = outcome.snap {
            self.metrics.record_off_route();
            debug!(trip_id = %trip_id, closest_m = %closest_m, "position_off_route");
        }

        if outcome.arrived_pickup {
            self.metrics.set_trip_state(TRIP_STATE_AT_PICKUP);
            self.emit_status(now_ms);
            self.persist();
        }

        if let Some(reached) = outcome.destination_reached_change {
            self.egress.send_destination_fence(DestinationFencePayload {
                driver: None,
                trip_id,
                reached,
                ts: now_ms,
            });
        }

        // The pickup leg route waits for the first fix
        self.maybe_request_routes();
    }

    /// Handle a surge zone snapshot: replace the board, then push the
    /// rendered hotspot and label view
    pub(crate) fn handle_surge(&mut self, zones: Vec<SurgeZone>, now_ms: u64) {
        let summary = self.surge.ingest(zones, now_ms);
        self.metrics.record_surge_snapshot(summary.dropped as u64);

        let hotspots = self.surge.hotspots();
        let labels = self.surge.labels();
        self.egress.send_surge_view(SurgeViewPayload {
            driver: None,
            ts: now_ms,
            hotspots: hotspots.iter().map(HotspotView::from).collect(),
            labels: labels.iter().map(LabelView::from).collect(),
        });
    }

    /// Dispatch a driver action to its handler
    pub(crate) fn handle_driver_action(&mut self, action: DriverAction, now_ms: u64) {
        match action {
            DriverAction::Accept => self.action_accept(now_ms),
            DriverAction::Decline { reason } => self.action_decline(reason, now_ms),
            DriverAction::Arrived => self.action_arrived(now_ms),
            DriverAction::StartTrip => self.action_start_trip(now_ms),
            DriverAction::CompleteTrip => self.action_complete(now_ms),
            DriverAction::Cancel { reason } => self.action_cancel(reason, now_ms),
        }
    }

    /// Accept the pending offer and open a trip from it
    fn action_accept(&mut self, now_ms: u64) {
        let offer = match self.offers.accept(now_ms) {
            Ok(offer) => offer,
            Err(e) => {
                warn!(error = %e, "accept_rejected");
                self.metrics.record_transition_rejected();
                return;
            }
        };

        self.metrics.record_offer_accepted();
        self.metrics.set_offer_pending(false);

        let offer_id = offer.id.clone();
        let machine = TripMachine::from_offer(offer, now_ms, self.config.trip_tuning());
        let trip_id = machine.trip_id().clone();
        info!(offer_id = %offer_id, trip_id = %trip_id, "offer_accepted");

        self.machine = Some(machine);
        self.metrics.set_trip_state(TRIP_STATE_EN_ROUTE);

        self.egress.send_offer_decision(OfferDecisionPayload {
            driver: None,
            t: "accepted".to_string(),
            offer_id: offer_id.0,
            trip_id: Some(trip_id.0),
            reason: None,
            note: None,
            ts: now_ms,
        });
        self.emit_status(now_ms);
        self.persist();
        self.maybe_request_routes();
    }

    /// Decline the pending offer on the driver's request
    fn action_decline(&mut self, note: Option<String>, now_ms: u64) {
        match self.offers.decline(now_ms) {
            Ok(offer) => {
                self.metrics.record_offer_declined(false);
                self.metrics.set_offer_pending(false);
                self.send_decline(&offer, DeclineKind::Driver, note, now_ms);
            }
            Err(e) => {
                warn!(error = %e, "decline_rejected");
                self.metrics.record_transition_rejected();
            }
        }
    }

    /// Driver tapped "arrived" before the pickup geofence fired
    fn action_arrived(&mut self, now_ms: u64) {
        let machine = match self.machine.as_mut() {
            Some(m) => m,
            None => {
                warn!(action = "arrived", "driver_action_without_trip");
                self.metrics.record_transition_rejected();
                return;
            }
        };
        match machine.manual_arrived(now_ms) {
            Ok(()) => {
                self.metrics.set_trip_state(TRIP_STATE_AT_PICKUP);
                self.emit_status(now_ms);
                self.persist();
            }
            Err(e) => {
                warn!(error = %e, "transition_rejected");
                self.metrics.record_transition_rejected();
            }
        }
    }

    /// Rider aboard: freeze the wait charge and begin the trip leg
    fn action_start_trip(&mut self, now_ms: u64) {
        let result = {
            let machine = match self.machine.as_mut() {
                Some(m) => m,
                None => {
                    warn!(action = "start_trip", "driver_action_without_trip");
                    self.metrics.record_transition_rejected();
                    return;
                }
            };
            machine
                .start_trip(now_ms)
                .map(|snapshot| (machine.trip_id().0.clone(), snapshot))
        };

        match result {
            Ok((trip_id, snapshot)) => {
                self.metrics.set_trip_state(TRIP_STATE_IN_TRIP);
                // Final frozen wait figure for the display
                self.egress.send_wait_update(WaitUpdatePayload::from_snapshot(
                    trip_id, snapshot, now_ms,
                ));
                self.emit_status(now_ms);
                self.persist();
                self.maybe_request_routes();
            }
            Err(e) => {
                warn!(error = %e, "transition_rejected");
                self.metrics.record_transition_rejected();
            }
        }
    }

    /// Driver confirmed drop-off; completion is always manual
    fn action_complete(&mut self, now_ms: u64) {
        let completed = {
            let machine = match self.machine.as_mut() {
                Some(m) => m,
                None => {
                    warn!(action = "complete_trip", "driver_action_without_trip");
                    self.metrics.record_transition_rejected();
                    return;
                }
            };
            machine.complete(now_ms).map(|trip| (trip.id.0.clone(), trip.fare))
        };

        match completed {
            Ok((trip_id, fare)) => {
                self.metrics.record_trip_completed();
                let total_usd = fare.map(|f| f.total_usd).unwrap_or(0.0);
                info!(trip_id = %trip_id, total_usd = %total_usd, "trip_completed");
                self.emit_status(now_ms);
                self.finish_trip();
            }
            Err(e) => {
                warn!(error = %e, "transition_rejected");
                self.metrics.record_transition_rejected();
            }
        }
    }

    /// Driver cancelled the active trip
    fn action_cancel(&mut self, note: Option<String>, now_ms: u64) {
        let cancelled = {
            let machine = match self.machine.as_mut() {
                Some(m) => m,
                None => {
                    warn!(action = "cancel", "driver_action_without_trip");
                    self.metrics.record_transition_rejected();
                    return;
                }
            };
            machine
                .cancel(CancelReason::driver(note), now_ms)
                .map(|trip| trip.id.0.clone())
        };

        match cancelled {
            Ok(trip_id) => {
                self.metrics.record_trip_cancelled();
                info!(trip_id = %trip_id, by = "driver", "trip_cancelled");
                self.emit_status(now_ms);
                self.finish_trip();
            }
            Err(e) => {
                warn!(error = %e, "transition_rejected");
                self.metrics.record_transition_rejected();
            }
        }
    }

    /// Handle a server push from dispatch
    pub(crate) fn handle_dispatch_push(&mut self, push: DispatchPush, now_ms: u64) {
        match push {
            DispatchPush::RiderCancelled { trip_id, reason } => {
                self.rider_cancelled(trip_id, reason, now_ms)
            }
        }
    }

    /// Rider-side cancellation pushed by dispatch. A push naming a
    /// different trip than the active one is stale and ignored.
    fn rider_cancelled(&mut self, trip_id: Option<String>, reason: Option<String>, now_ms: u64) {
        let cancelled = {
            let machine = match self.machine.as_mut() {
                Some(m) => m,
                None => {
                    warn!("rider_cancel_without_trip");
                    return;
                }
            };
            if let Some(id) = &trip_id {
                if *id != machine.trip_id().0 {
                    warn!(
                        pushed_trip_id = %id,
                        active_trip_id = %machine.trip_id(),
                        "rider_cancel_trip_mismatch"
                    );
                    return;
                }
            }
            machine
                .cancel(CancelReason::rider(reason), now_ms)
                .map(|trip| trip.id.0.clone())
        };

        match cancelled {
            Ok(trip_id) => {
                self.metrics.record_trip_cancelled();
                info!(trip_id = %trip_id, by = "rider", "trip_cancelled");
                self.emit_status(now_ms);
                self.finish_trip();
            }
            Err(e) => {
                warn!(error = %e, "transition_rejected");
                self.metrics.record_transition_rejected();
            }
        }
    }

    /// Attach a fetched route to the trip it was requested for.
    /// Routes for finished or superseded trips are dropped.
    pub(crate) fn handle_route_ready(&mut self, trip_id: TripId, leg: RouteLeg, plan: RoutePlan) {
        let machine = match self.machine.as_mut() {
            Some(m) => m,
            None => {
                debug!(trip_id = %trip_id, leg = leg.as_str(), "route_for_finished_trip");
                return;
            }
        };
        if *machine.trip_id() != trip_id || machine.is_terminal() {
            debug!(trip_id = %trip_id, leg = leg.as_str(), "route_for_stale_trip");
            return;
        }

        self.metrics.record_route_fetched();
        machine.attach_route(leg, plan);
    }

    /// Substitute the straight-line fallback after a failed fetch
    pub(crate) fn handle_route_failed(&mut self, trip_id: TripId, leg: RouteLeg) {
        let machine = match self.machine.as_mut() {
            Some(m) => m,
            None => {
                debug!(trip_id = %trip_id, leg = leg.as_str(), "route_for_finished_trip");
                return;
            }
        };
        if *machine.trip_id() != trip_id || machine.is_terminal() {
            debug!(trip_id = %trip_id, leg = leg.as_str(), "route_for_stale_trip");
            return;
        }

        self.metrics.record_route_fallback();
        let trip = machine.trip();
        let (from, to) = match leg {
            RouteLeg::Pickup => (
                machine.last_position().unwrap_or(trip.pickup.coord),
                trip.pickup.coord,
            ),
            RouteLeg::Trip => (trip.pickup.coord, trip.destination.coord),
        };
        machine.attach_route(leg, fallback_plan(from, to));
    }

    /// Request the route for the active leg if it has not been requested
    /// for this trip yet. The pickup leg waits for the first position
    /// fix; the trip leg starts from the pickup.
    pub(crate) fn maybe_request_routes(&mut self) {
        let request = {
            let Some(machine) = self.machine.as_ref() else {
                return;
            };
            let trip = machine.trip();
            match trip.status {
                TripStatus::EnRouteToPickup if !self.pickup_route_requested => machine
                    .last_position()
                    .map(|from| (trip.id.clone(), RouteLeg::Pickup, from, trip.pickup.coord)),
                TripStatus::InTrip if !self.trip_route_requested => Some((
                    trip.id.clone(),
                    RouteLeg::Trip,
                    trip.pickup.coord,
                    trip.destination.coord,
                )),
                _ => None,
            }
        };

        if let Some((trip_id, leg, from, to)) = request {
            match leg {
                RouteLeg::Pickup => self.pickup_route_requested = true,
                RouteLeg::Trip => self.trip_route_requested = true,
            }
            self.request_route(trip_id, leg, from, to);
        }
    }

    fn request_route(&mut self, trip_id: TripId, leg: RouteLeg, from: Coordinate, to: Coordinate) {
        if self.config.routing_enabled() {
            spawn_route_fetch(
                self.routes.clone(),
                trip_id,
                leg,
                from,
                to,
                self.events_tx.clone(),
            );
            return;
        }

        // Routing disabled: the trip carries the straight-line estimate
        self.metrics.record_route_fallback();
        if let Some(machine) = self.machine.as_mut() {
            machine.attach_route(leg, fallback_plan(from, to));
        }
    }

    /// Publish a decline decision for an offer
    pub(crate) fn send_decline(
        &self,
        offer: &RideOffer,
        kind: DeclineKind,
        note: Option<String>,
        now_ms: u64,
    ) {
        info!(offer_id = %offer.id, reason = kind.as_str(), "offer_declined");
        self.egress.send_offer_decision(OfferDecisionPayload {
            driver: None,
            t: "declined".to_string(),
            offer_id: offer.id.0.clone(),
            trip_id: None,
            reason: Some(kind.as_str().to_string()),
            note,
            ts: now_ms,
        });
    }

    /// Publish a countdown frame for the pending offer
    pub(crate) fn send_countdown(&self, offer_id: &OfferId, remaining_s: u64, now_ms: u64) {
        self.egress.send_offer_countdown(OfferCountdownPayload {
            driver: None,
            offer_id: offer_id.0.clone(),
            remaining_s,
            ts: now_ms,
        });
    }

    /// Publish the active trip's current status
    pub(crate) fn emit_status(&self, now_ms: u64) {
        let Some(machine) = self.machine.as_ref() else {
            return;
        };
        let trip = machine.trip();
        self.egress.send_trip_status(TripStatusPayload {
            driver: None,
            trip_id: trip.id.0.clone(),
            status: trip.status.as_str().to_string(),
            ts: now_ms,
            wait_charge_usd: trip.wait_charge_usd,
            fare_base_usd: trip.fare.map(|f| f.base_usd),
            fare_total_usd: trip.fare.map(|f| f.total_usd),
            cancelled_by: trip.cancel_reason.as_ref().map(|r| r.by.as_str().to_string()),
        });
    }

    /// Write or clear the restart snapshot to match the trip's state
    pub(crate) fn persist(&self) {
        let Some(machine) = self.machine.as_ref() else {
            return;
        };
        if machine.is_terminal() {
            self.snapshots.clear();
        } else {
            self.snapshots.save(machine.trip());
        }
    }

    /// Archive a finished trip and reset per-trip session state
    fn finish_trip(&mut self) {
        let Some(machine) = self.machine.take() else {
            return;
        };
        self.archive.record(machine.trip());
        self.snapshots.clear();
        self.metrics.set_trip_state(TRIP_STATE_IDLE);
        self.pickup_route_requested = false;
        self.trip_route_requested = false;
    }
}
