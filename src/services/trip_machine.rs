//! Trip machine - owns the active trip and its side state
//!
//! Wraps the `Trip` entity with everything that travels with it during
//! a session: the pickup arrival latch, the wait billing session, the
//! per-leg route plans and the destination proximity flag. Transition
//! legality stays in the domain; this layer sequences the side effects
//! around each transition and keeps them honest across rehydration.

use crate::domain::offer::RideOffer;
use crate::domain::trip::{
    CancelReason, RoutePlan, TransitionError, Trip, TripStatus,
};
use crate::domain::types::{Coordinate, RouteLeg, TripId};
use crate::geo::distance::is_within_radius;
use crate::geo::polyline::SnapResult;
use crate::services::wait_billing::{WaitSession, WaitSnapshot};
use tracing::{info, warn};

/// Geofence, snapping and billing thresholds, all configurable
#[derive(Debug, Clone)]
pub struct TripTuning {
    pub arrival_radius_m: f64,
    pub destination_radius_m: f64,
    pub snap_threshold_m: f64,
    pub wait_grace_ms: u64,
    pub wait_rate_per_min_usd: f64,
}

impl Default for TripTuning {
    fn default() -> Self {
        Self {
            arrival_radius_m: 100.0,
            destination_radius_m: 100.0,
            snap_threshold_m: 100.0,
            wait_grace_ms: 120_000,
            wait_rate_per_min_usd: 0.35,
        }
    }
}

/// What one position fix changed
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionOutcome {
    /// The pickup arrival one-shot fired on this fix
    pub arrived_pickup: bool,
    /// Destination proximity flipped (true = entered, false = left)
    pub destination_reached_change: Option<bool>,
    pub snap: Option<SnapResult>,
    /// Meters left on the active leg after snapping
    pub remaining_m: Option<f64>,
}

/// Wait accrual surfaced by the 1 Hz tick
#[derive(Debug, Clone, Copy)]
pub struct WaitTick {
    pub snapshot: WaitSnapshot,
    /// The grace period ran out on this tick
    pub grace_just_exceeded: bool,
}

/// The active trip plus its session-scoped side state
pub struct TripMachine {
    trip: Trip,
    tuning: TripTuning,
    /// Latched so dwelling in or re-entering the pickup fence cannot
    /// re-fire arrival
    arrival_fired: bool,
    wait: Option<WaitSession>,
    grace_logged: bool,
    pickup_plan: Option<RoutePlan>,
    trip_plan: Option<RoutePlan>,
    destination_reached: bool,
    last_position: Option<Coordinate>,
}

impl TripMachine {
    /// Start a fresh trip from an accepted offer
    pub fn from_offer(offer: RideOffer, now_ms: u64, tuning: TripTuning) -> Self {
        let trip = Trip::from_offer(offer, now_ms);
        Self {
            trip,
            tuning,
            arrival_fired: false,
            wait: None,
            grace_logged: false,
            pickup_plan: None,
            trip_plan: None,
            destination_reached: false,
            last_position: None,
        }
    }

    /// Resume a persisted trip after restart.
    ///
    /// One-shots that already fired stay fired: the arrival latch is
    /// derived from the persisted lifecycle, and the wait session picks
    /// up from the persisted arrival instant instead of restarting.
    pub fn resume(mut trip: Trip, now_ms: u64, tuning: TripTuning) -> Self {
        trip.mark_rehydrated(now_ms);

        let arrival_fired =
            trip.arrived_at_ms.is_some() || !matches!(trip.status, TripStatus::EnRouteToPickup);
        let wait = match trip.status {
            TripStatus::AtPickup => {
                let started = trip.arrived_at_ms.unwrap_or(now_ms);
                Some(WaitSession::new(started, tuning.wait_grace_ms, tuning.wait_rate_per_min_usd))
            }
            _ => None,
        };
        let grace_logged =
            wait.as_ref().map(|w| !w.snapshot(now_ms).in_grace()).unwrap_or(false);

        info!(
            trip_id = %trip.id,
            status = %trip.status.as_str(),
            arrival_fired = %arrival_fired,
            "trip_rehydrated"
        );

        Self {
            trip,
            tuning,
            arrival_fired,
            wait,
            grace_logged,
            pickup_plan: None,
            trip_plan: None,
            destination_reached: false,
            last_position: None,
        }
    }

    #[inline]
    pub fn trip(&self) -> &Trip {
        &self.trip
    }

    #[inline]
    pub fn trip_id(&self) -> &TripId {
        &self.trip.id
    }

    #[inline]
    pub fn status(&self) -> TripStatus {
        self.trip.status
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.trip.status.is_terminal()
    }

    #[inline]
    pub fn destination_reached(&self) -> bool {
        self.destination_reached
    }

    #[inline]
    pub fn last_position(&self) -> Option<Coordinate> {
        self.last_position
    }

    /// Store an enrichment result for a leg
    pub fn attach_route(&mut self, leg: RouteLeg, plan: RoutePlan) {
        info!(
            trip_id = %self.trip.id,
            leg = %leg.as_str(),
            points = %plan.polyline.len(),
            miles = %plan.distance_miles,
            source = %plan.source.as_str(),
            "route_attached"
        );
        match leg {
            RouteLeg::Pickup => self.pickup_plan = Some(plan),
            RouteLeg::Trip => self.trip_plan = Some(plan),
        }
    }

    pub fn route(&self, leg: RouteLeg) -> Option<&RoutePlan> {
        match leg {
            RouteLeg::Pickup => self.pickup_plan.as_ref(),
            RouteLeg::Trip => self.trip_plan.as_ref(),
        }
    }

    /// Feed one position fix through snapping, the pickup arrival
    /// one-shot and the destination proximity check
    pub fn on_position(&mut self, position: Coordinate, now_ms: u64) -> PositionOutcome {
        self.last_position = Some(position);
        let mut out = PositionOutcome::default();

        if self.trip.status.is_terminal() {
            return out;
        }

        if let Some(leg) = self.trip.active_leg() {
            let plan = match leg {
                RouteLeg::Pickup => self.pickup_plan.as_mut(),
                RouteLeg::Trip => self.trip_plan.as_mut(),
            };
            if let Some(plan) = plan {
                if !plan.polyline.is_empty() {
                    out.snap = Some(plan.polyline.snap_and_trim(position, self.tuning.snap_threshold_m));
                    out.remaining_m = Some(plan.polyline.remaining_meters());
                }
            }
        }

        if self.trip.status == TripStatus::EnRouteToPickup
            && !self.arrival_fired
            && is_within_radius(position, self.trip.pickup.coord, self.tuning.arrival_radius_m)
            && self.fire_arrival(now_ms).is_ok()
        {
            out.arrived_pickup = true;
        }

        if self.trip.status == TripStatus::InTrip {
            let near = is_within_radius(
                position,
                self.trip.destination.coord,
                self.tuning.destination_radius_m,
            );
            if near != self.destination_reached {
                self.destination_reached = near;
                out.destination_reached_change = Some(near);
                info!(trip_id = %self.trip.id, reached = %near, "destination_proximity");
            }
        }

        out
    }

    /// Driver tapped "arrived" before the geofence fired
    pub fn manual_arrived(&mut self, now_ms: u64) -> Result<(), TransitionError> {
        self.fire_arrival(now_ms)
    }

    fn fire_arrival(&mut self, now_ms: u64) -> Result<(), TransitionError> {
        self.trip.transition(TripStatus::AtPickup, now_ms)?;
        self.arrival_fired = true;
        self.wait = Some(WaitSession::new(
            now_ms,
            self.tuning.wait_grace_ms,
            self.tuning.wait_rate_per_min_usd,
        ));
        info!(trip_id = %self.trip.id, "arrived_pickup");
        Ok(())
    }

    /// Rider is aboard: freeze the wait charge and enter `InTrip`
    pub fn start_trip(&mut self, now_ms: u64) -> Result<WaitSnapshot, TransitionError> {
        self.trip.transition(TripStatus::InTrip, now_ms)?;

        let snapshot = match self.wait.as_mut() {
            Some(wait) => wait.freeze(now_ms),
            // AtPickup without a wait session only happens in odd
            // rehydration states; bill nothing
            None => WaitSession::new(now_ms, self.tuning.wait_grace_ms, self.tuning.wait_rate_per_min_usd)
                .freeze(now_ms),
        };
        self.trip.wait_charge_usd = Some(snapshot.charge_usd);
        self.destination_reached = false;

        info!(
            trip_id = %self.trip.id,
            waited_s = %snapshot.waited_secs(),
            wait_charge = %snapshot.charge_usd,
            "trip_started"
        );
        Ok(snapshot)
    }

    /// Driver confirmed drop-off. The destination geofence only enables
    /// the control in the UI; a completion away from the fence is
    /// accepted with a warning so GPS noise can never trap a trip.
    pub fn complete(&mut self, now_ms: u64) -> Result<&Trip, TransitionError> {
        self.trip.transition(TripStatus::Completed, now_ms)?;
        if !self.destination_reached {
            warn!(trip_id = %self.trip.id, "completed_outside_destination_fence");
        }
        Ok(&self.trip)
    }

    pub fn cancel(&mut self, reason: CancelReason, now_ms: u64) -> Result<&Trip, TransitionError> {
        self.trip.cancel(reason, now_ms)?;
        Ok(&self.trip)
    }

    /// 1 Hz wait accrual while parked at the pickup
    pub fn tick(&mut self, now_ms: u64) -> Option<WaitTick> {
        if self.trip.status != TripStatus::AtPickup {
            return None;
        }
        let wait = self.wait.as_ref()?;
        let snapshot = wait.snapshot(now_ms);

        let grace_just_exceeded = !self.grace_logged && !snapshot.in_grace();
        if grace_just_exceeded {
            self.grace_logged = true;
            warn!(
                trip_id = %self.trip.id,
                waited_s = %snapshot.waited_secs(),
                "wait_grace_exceeded"
            );
        }

        Some(WaitTick { snapshot, grace_just_exceeded })
    }

    pub fn wait_snapshot(&self, now_ms: u64) -> Option<WaitSnapshot> {
        self.wait.as_ref().map(|w| w.snapshot(now_ms))
    }
}
