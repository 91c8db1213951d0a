//! Domain models - core business types and the trip model
//!
//! This module contains the canonical data types used throughout the system:
//! - `Trip` - the primary business entity representing an active ride
//! - `RideOffer` - a time-boxed ride proposal from dispatch
//! - `TripEvent` - typed events consumed by the session loop
//! - `TripStatus` - lifecycle states of a trip
//! - wire payloads for the dispatch, location, pricing and driver-action feeds

pub mod offer;
pub mod trip;
pub mod types;

// Re-export commonly used types at module level
pub use offer::RideOffer;
pub use trip::{Trip, TripStatus};
pub use types::{Coordinate, TripEvent, TripId};
