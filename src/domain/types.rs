//! Shared types for the trip coordination core

use serde::{Deserialize, Deserializer, Serialize};

/// Newtype wrapper for trip IDs (UUIDv7 strings) to provide type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TripId(pub String);

impl std::fmt::Display for TripId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Newtype wrapper for dispatch-assigned offer IDs to provide type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct OfferId(pub String);

impl std::fmt::Display for OfferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Geographic coordinate in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    #[inline]
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// A named place: street address plus its coordinate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub address: String,
    #[serde(flatten)]
    pub coord: Coordinate,
}

impl Location {
    pub fn new(address: impl Into<String>, lat: f64, lng: f64) -> Self {
        Self {
            address: address.into(),
            coord: Coordinate::new(lat, lng),
        }
    }
}

/// What the driver sees about the rider before and during a trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiderSummary {
    pub name: String,
    pub rating: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

/// Ride offer message from dispatch
#[derive(Debug, Clone, Deserialize)]
pub struct OfferMessage {
    pub offer_id: String,
    pub rider: RiderSummary,
    pub pickup: Location,
    pub destination: Location,
    pub estimated_fare: f64,
    pub estimated_distance_miles: f64,
    pub estimated_duration_minutes: f64,
    #[serde(default = "default_surge_multiplier")]
    pub surge_multiplier: f64,
    /// Absolute deadline - RFC 3339 string or epoch milliseconds
    #[serde(default, deserialize_with = "deserialize_expiry")]
    pub expires_at: ExpiryStamp,
    /// Relative answer window, used when dispatch sends no absolute deadline
    #[serde(default)]
    pub offer_window_ms: Option<u64>,
}

fn default_surge_multiplier() -> f64 {
    1.0
}

/// Offer deadline that can be either an RFC 3339 string or epoch milliseconds
#[derive(Debug, Clone, Default)]
pub enum ExpiryStamp {
    #[default]
    None,
    Rfc3339(String),
    EpochMs(u64),
}

impl ExpiryStamp {
    /// Resolve to epoch milliseconds. Unparseable RFC 3339 strings resolve
    /// to `None` so the caller falls back to the relative window.
    pub fn to_epoch_ms(&self) -> Option<u64> {
        match self {
            ExpiryStamp::None => None,
            ExpiryStamp::EpochMs(ms) => Some(*ms),
            ExpiryStamp::Rfc3339(s) => {
                use time::format_description::well_known::Rfc3339;
                time::OffsetDateTime::parse(s, &Rfc3339)
                    .ok()
                    .map(|t| (t.unix_timestamp_nanos() / 1_000_000) as u64)
            }
        }
    }
}

fn deserialize_expiry<'de, D>(deserializer: D) -> Result<ExpiryStamp, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct ExpiryVisitor;

    impl<'de> Visitor<'de> for ExpiryVisitor {
        type Value = ExpiryStamp;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or integer deadline")
        }

        fn visit_str<E>(self, value: &str) -> Result<ExpiryStamp, E>
        where
            E: de::Error,
        {
            Ok(ExpiryStamp::Rfc3339(value.to_string()))
        }

        fn visit_string<E>(self, value: String) -> Result<ExpiryStamp, E>
        where
            E: de::Error,
        {
            Ok(ExpiryStamp::Rfc3339(value))
        }

        fn visit_u64<E>(self, value: u64) -> Result<ExpiryStamp, E>
        where
            E: de::Error,
        {
            Ok(ExpiryStamp::EpochMs(value))
        }

        fn visit_i64<E>(self, value: i64) -> Result<ExpiryStamp, E>
        where
            E: de::Error,
        {
            let ms = u64::try_from(value).unwrap_or(0);
            Ok(ExpiryStamp::EpochMs(ms))
        }

        fn visit_unit<E>(self) -> Result<ExpiryStamp, E>
        where
            E: de::Error,
        {
            Ok(ExpiryStamp::None)
        }
    }

    deserializer.deserialize_any(ExpiryVisitor)
}

/// Device position sample from the location provider
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PositionSample {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub speed_mps: Option<f64>,
    #[serde(default)]
    pub ts: Option<u64>,
}

impl PositionSample {
    #[inline]
    pub fn coord(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lng)
    }
}

/// Surge zone classification from the pricing feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    Airport,
    #[default]
    #[serde(other)]
    General,
}

impl ZoneKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneKind::Airport => "airport",
            ZoneKind::General => "general",
        }
    }
}

/// One surge zone from a pricing snapshot
#[derive(Debug, Clone, Deserialize)]
pub struct SurgeZone {
    pub id: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub zone_type: ZoneKind,
    pub center: Coordinate,
    /// Ordered boundary ring; feeds that only carry a center omit it
    #[serde(default)]
    pub polygon: Vec<Coordinate>,
    pub multiplier: f64,
    #[serde(default)]
    pub surge_amount: Option<f64>,
}

/// Full surge snapshot message from the pricing feed
#[derive(Debug, Clone, Deserialize)]
pub struct SurgeSnapshotMessage {
    pub zones: Vec<SurgeZone>,
}

/// Manual action taken by the driver in the app UI
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DriverAction {
    Accept,
    Decline {
        #[serde(default)]
        reason: Option<String>,
    },
    Arrived,
    StartTrip,
    CompleteTrip,
    Cancel {
        #[serde(default)]
        reason: Option<String>,
    },
}

impl DriverAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverAction::Accept => "accept",
            DriverAction::Decline { .. } => "decline",
            DriverAction::Arrived => "arrived",
            DriverAction::StartTrip => "start_trip",
            DriverAction::CompleteTrip => "complete_trip",
            DriverAction::Cancel { .. } => "cancel",
        }
    }
}

/// Trip-scoped push from dispatch
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DispatchPush {
    RiderCancelled {
        #[serde(default)]
        trip_id: Option<String>,
        #[serde(default)]
        reason: Option<String>,
    },
}

/// Which leg of the active trip a route belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteLeg {
    /// Driver to the pickup point
    Pickup,
    /// Pickup point to the destination
    Trip,
}

impl RouteLeg {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteLeg::Pickup => "pickup",
            RouteLeg::Trip => "trip",
        }
    }
}

/// Internal event consumed by the trip session loop.
///
/// Every external input (dispatch, location provider, pricing feed,
/// driver UI, route enrichment) arrives here; the session task is the
/// single consumer and the only place trip state mutates.
#[derive(Debug, Clone)]
pub enum TripEvent {
    OfferReceived(crate::domain::offer::RideOffer),
    Position(PositionSample),
    SurgeSnapshot(Vec<SurgeZone>),
    DriverAction(DriverAction),
    DispatchPush(DispatchPush),
    RouteReady {
        trip_id: TripId,
        leg: RouteLeg,
        plan: crate::domain::trip::RoutePlan,
    },
    RouteFailed {
        trip_id: TripId,
        leg: RouteLeg,
    },
}

impl TripEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            TripEvent::OfferReceived(_) => "offer_received",
            TripEvent::Position(_) => "position",
            TripEvent::SurgeSnapshot(_) => "surge_snapshot",
            TripEvent::DriverAction(_) => "driver_action",
            TripEvent::DispatchPush(_) => "dispatch_push",
            TripEvent::RouteReady { .. } => "route_ready",
            TripEvent::RouteFailed { .. } => "route_failed",
        }
    }
}
