//! Distance and projection primitives
//!
//! All functions are total for finite inputs: no panics, no NaN for
//! valid coordinates. Geofence checks and displayed distances both go
//! through `distance_meters`, so the two can never disagree.

use crate::domain::types::Coordinate;

/// Mean Earth radius in meters
const EARTH_RADIUS_M: f64 = 6_371_000.0;

const METERS_PER_MILE: f64 = 1_609.344;

/// Haversine great-circle distance between two coordinates, in meters.
///
/// # Example
///
/// ```
/// use trip_core::domain::types::Coordinate;
/// use trip_core::geo::distance::distance_meters;
///
/// let a = Coordinate::new(36.373, -94.209);
/// let d = distance_meters(a, a);
/// assert_eq!(d, 0.0);
/// ```
pub fn distance_meters(a: Coordinate, b: Coordinate) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Whether `p` lies within `radius_m` meters of `center`.
///
/// This is exactly `distance_meters(p, center) <= radius_m`; geofence
/// membership never uses a different formula than the distance itself.
#[inline]
pub fn is_within_radius(p: Coordinate, center: Coordinate, radius_m: f64) -> bool {
    distance_meters(p, center) <= radius_m
}

#[inline]
pub fn meters_to_miles(meters: f64) -> f64 {
    meters / METERS_PER_MILE
}

/// Closest point on segment `ab` to `p`, plus the clamped interpolation
/// parameter `t` in `[0, 1]`.
///
/// Works in an equirectangular plane: longitude is scaled by the cosine
/// of the segment's mean latitude so both axes are locally comparable.
/// Good enough at city scale; not for long or polar segments. A
/// degenerate segment (`a == b`) returns `(a, 0.0)`.
pub fn project_onto_segment(p: Coordinate, a: Coordinate, b: Coordinate) -> (Coordinate, f64) {
    let lng_scale = ((a.lat + b.lat) * 0.5).to_radians().cos();

    let ax = a.lng * lng_scale;
    let ay = a.lat;
    let bx = b.lng * lng_scale;
    let by = b.lat;
    let px = p.lng * lng_scale;
    let py = p.lat;

    let dx = bx - ax;
    let dy = by - ay;
    let len_sq = dx * dx + dy * dy;
    if len_sq <= f64::EPSILON {
        return (a, 0.0);
    }

    let t = (((px - ax) * dx + (py - ay) * dy) / len_sq).clamp(0.0, 1.0);
    let projected = Coordinate::new(a.lat + (b.lat - a.lat) * t, a.lng + (b.lng - a.lng) * t);
    (projected, t)
}
