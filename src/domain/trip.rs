//! Trip data model for the active ride lifecycle
//!
//! A `Trip` is born when the driver accepts an offer and moves through
//! `EnRouteToPickup -> AtPickup -> InTrip -> Completed`, with `Cancelled`
//! reachable from every non-terminal state. Transition legality lives
//! here; side effects (wait billing, routes, egress) live in the
//! services layer. Trips serialize losslessly so an active one can be
//! rehydrated after a process restart.

use crate::domain::offer::RideOffer;
use crate::domain::types::{Location, OfferId, RiderSummary, RouteLeg, TripId};
use crate::geo::polyline::RoutePolyline;
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable)
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Trip lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    EnRouteToPickup,
    AtPickup,
    InTrip,
    Completed,
    Cancelled,
}

impl TripStatus {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::EnRouteToPickup => "en_route_to_pickup",
            TripStatus::AtPickup => "at_pickup",
            TripStatus::InTrip => "in_trip",
            TripStatus::Completed => "completed",
            TripStatus::Cancelled => "cancelled",
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TripStatus::Completed | TripStatus::Cancelled)
    }
}

/// Rejected trip transition, state left untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionError {
    pub from: TripStatus,
    pub to: TripStatus,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid trip transition {} -> {}", self.from.as_str(), self.to.as_str())
    }
}

impl std::error::Error for TransitionError {}

/// Which side ended the trip early
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelParty {
    Driver,
    Rider,
}

impl CancelParty {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelParty::Driver => "driver",
            CancelParty::Rider => "rider",
        }
    }
}

/// Why a trip was cancelled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelReason {
    pub by: CancelParty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl CancelReason {
    pub fn driver(note: Option<String>) -> Self {
        Self { by: CancelParty::Driver, note }
    }

    pub fn rider(note: Option<String>) -> Self {
        Self { by: CancelParty::Rider, note }
    }
}

/// Final fare assembled on completion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FareBreakdown {
    pub base_usd: f64,
    pub wait_usd: f64,
    pub total_usd: f64,
}

impl FareBreakdown {
    pub fn new(base_usd: f64, wait_usd: f64) -> Self {
        Self { base_usd, wait_usd, total_usd: base_usd + wait_usd }
    }
}

/// Lifecycle moments recorded on the trip timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripMomentKind {
    Accepted,
    ArrivedPickup,
    TripStarted,
    Completed,
    Cancelled,
    Rehydrated,
}

impl TripMomentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripMomentKind::Accepted => "accepted",
            TripMomentKind::ArrivedPickup => "arrived_pickup",
            TripMomentKind::TripStarted => "trip_started",
            TripMomentKind::Completed => "completed",
            TripMomentKind::Cancelled => "cancelled",
            TripMomentKind::Rehydrated => "rehydrated",
        }
    }
}

/// A single timeline entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripMoment {
    pub kind: TripMomentKind,
    pub ts: u64, // epoch ms
}

impl TripMoment {
    pub fn new(kind: TripMomentKind, ts: u64) -> Self {
        Self { kind, ts }
    }
}

/// Route enrichment result for one leg.
///
/// Not persisted with the trip; routes are re-requested on rehydration.
#[derive(Debug, Clone)]
pub struct RoutePlan {
    pub polyline: RoutePolyline,
    pub distance_miles: f64,
    pub duration_minutes: f64,
    pub source: RouteSource,
}

/// Where a route plan came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteSource {
    /// Routing service response
    Service,
    /// Straight-line Haversine fallback
    StraightLine,
}

impl RouteSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteSource::Service => "service",
            RouteSource::StraightLine => "straight_line",
        }
    }
}

/// The active trip entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub id: TripId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer_id: Option<OfferId>,
    pub rider: RiderSummary,
    pub pickup: Location,
    pub destination: Location,
    pub estimated_fare: f64,
    pub estimated_distance_miles: f64,
    pub estimated_duration_minutes: f64,
    pub surge_multiplier: f64,
    pub status: TripStatus,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrived_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at_ms: Option<u64>,
    /// Wait charge frozen on the AtPickup -> InTrip transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_charge_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<CancelReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fare: Option<FareBreakdown>,
    pub moments: SmallVec<[TripMoment; 8]>,
}

impl Trip {
    /// Create a trip from an accepted offer.
    ///
    /// The trip starts in `EnRouteToPickup` with a fresh UUIDv7 id and
    /// the acceptance recorded on its timeline.
    ///
    /// # Example
    ///
    /// ```
    /// use trip_core::domain::offer::RideOffer;
    /// use trip_core::domain::trip::{Trip, TripStatus};
    /// use trip_core::domain::types::{Location, OfferId, RiderSummary};
    ///
    /// let offer = RideOffer {
    ///     id: OfferId("of-1".to_string()),
    ///     rider: RiderSummary { name: "Ana".into(), rating: 4.9, phone: None, photo_url: None },
    ///     pickup: Location::new("100 Main St", 36.373, -94.209),
    ///     destination: Location::new("200 Elm St", 36.385, -94.220),
    ///     estimated_fare: 12.5,
    ///     estimated_distance_miles: 3.2,
    ///     estimated_duration_minutes: 11.0,
    ///     surge_multiplier: 1.0,
    ///     expires_at_ms: 15_000,
    /// };
    /// let trip = Trip::from_offer(offer, 1_000);
    /// assert_eq!(trip.status, TripStatus::EnRouteToPickup);
    /// assert_eq!(trip.created_at_ms, 1_000);
    /// ```
    pub fn from_offer(offer: RideOffer, now_ms: u64) -> Self {
        Self {
            id: TripId(new_uuid_v7()),
            offer_id: Some(offer.id),
            rider: offer.rider,
            pickup: offer.pickup,
            destination: offer.destination,
            estimated_fare: offer.estimated_fare,
            estimated_distance_miles: offer.estimated_distance_miles,
            estimated_duration_minutes: offer.estimated_duration_minutes,
            surge_multiplier: offer.surge_multiplier,
            status: TripStatus::EnRouteToPickup,
            created_at_ms: now_ms,
            arrived_at_ms: None,
            started_at_ms: None,
            completed_at_ms: None,
            cancelled_at_ms: None,
            wait_charge_usd: None,
            cancel_reason: None,
            fare: None,
            moments: smallvec![TripMoment::new(TripMomentKind::Accepted, now_ms)],
        }
    }

    /// Apply a lifecycle transition, stamping its timestamp and timeline
    /// moment. Illegal pairs are rejected and leave the trip untouched.
    ///
    /// Completion assembles the fare breakdown from the quoted estimate
    /// plus any frozen wait charge.
    pub fn transition(&mut self, to: TripStatus, now_ms: u64) -> Result<(), TransitionError> {
        match (self.status, to) {
            (TripStatus::EnRouteToPickup, TripStatus::AtPickup) => {
                self.arrived_at_ms = Some(now_ms);
                self.moments.push(TripMoment::new(TripMomentKind::ArrivedPickup, now_ms));
            }
            (TripStatus::AtPickup, TripStatus::InTrip) => {
                self.started_at_ms = Some(now_ms);
                self.moments.push(TripMoment::new(TripMomentKind::TripStarted, now_ms));
            }
            (TripStatus::InTrip, TripStatus::Completed) => {
                self.completed_at_ms = Some(now_ms);
                self.fare = Some(FareBreakdown::new(
                    self.estimated_fare,
                    self.wait_charge_usd.unwrap_or(0.0),
                ));
                self.moments.push(TripMoment::new(TripMomentKind::Completed, now_ms));
            }
            (from, TripStatus::Cancelled) if !from.is_terminal() => {
                self.cancelled_at_ms = Some(now_ms);
                self.moments.push(TripMoment::new(TripMomentKind::Cancelled, now_ms));
            }
            (from, to) => return Err(TransitionError { from, to }),
        }
        self.status = to;
        Ok(())
    }

    /// Cancel with a reason; same legality rules as `transition`
    pub fn cancel(&mut self, reason: CancelReason, now_ms: u64) -> Result<(), TransitionError> {
        self.transition(TripStatus::Cancelled, now_ms)?;
        self.cancel_reason = Some(reason);
        Ok(())
    }

    /// The leg whose route should be followed right now, if any
    pub fn active_leg(&self) -> Option<RouteLeg> {
        match self.status {
            TripStatus::EnRouteToPickup => Some(RouteLeg::Pickup),
            TripStatus::InTrip => Some(RouteLeg::Trip),
            TripStatus::AtPickup | TripStatus::Completed | TripStatus::Cancelled => None,
        }
    }

    /// Record a rehydration moment after loading a persisted trip
    pub fn mark_rehydrated(&mut self, now_ms: u64) {
        self.moments.push(TripMoment::new(TripMomentKind::Rehydrated, now_ms));
    }
}
