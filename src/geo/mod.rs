//! Geometry primitives - distances, geofences and route polylines
//!
//! This module contains the pure geometry the trip services build on:
//! - `distance` - Haversine distance, radius membership, segment projection
//! - `polyline` - encoded polyline decoding and snap-and-trim progress

pub mod distance;
pub mod polyline;

// Re-export commonly used functions
pub use distance::{distance_meters, is_within_radius, meters_to_miles, project_onto_segment};
pub use polyline::RoutePolyline;
