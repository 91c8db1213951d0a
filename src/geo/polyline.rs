//! Encoded polyline decoding and snap-and-trim route progress
//!
//! Routes arrive as Google encoded polylines (precision 5). Decoding is
//! fail-soft: malformed input yields an empty polyline and the caller
//! treats that as "no route available". The decoded vertex sequence is
//! immutable; every position fix derives a fresh remainder view from it.

use crate::domain::types::Coordinate;
use crate::geo::distance::{distance_meters, project_onto_segment};
use tracing::debug;

/// Decoded route plus the remainder view derived from the latest fix
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RoutePolyline {
    /// Full vertex sequence as decoded; never modified afterwards
    points: Vec<Coordinate>,
    /// View from the latest on-route fix: the fix itself followed by
    /// the source vertices from the closest one onward. `None` until a
    /// fix lands on the route, and again after one strays off it.
    remaining: Option<Vec<Coordinate>>,
}

/// Outcome of snapping one position fix against the stored route
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SnapResult {
    /// No route stored, or a single point with no segments
    NoRoute,
    /// Fix matched the route; the remainder view was rederived
    Snapped { distance_m: f64 },
    /// Fix is farther than the threshold from every segment; the view
    /// falls back to the whole route
    OffRoute { closest_m: f64 },
}

impl RoutePolyline {
    pub fn new(points: Vec<Coordinate>) -> Self {
        Self { points, remaining: None }
    }

    pub fn empty() -> Self {
        Self { points: Vec::new(), remaining: None }
    }

    /// Decode a Google polyline5 string.
    ///
    /// Any malformed byte, truncated value or missing longitude makes the
    /// whole result empty; a partial route is worse than none.
    pub fn decode(encoded: &str) -> Self {
        let bytes = encoded.as_bytes();
        let mut points = Vec::with_capacity(bytes.len() / 4);
        let mut idx = 0usize;
        let mut lat = 0i64;
        let mut lng = 0i64;

        while idx < bytes.len() {
            let (d_lat, next) = match decode_component(bytes, idx) {
                Some(v) => v,
                None => {
                    debug!(at = idx, len = bytes.len(), "polyline_decode_failed");
                    return Self::empty();
                }
            };
            let (d_lng, next) = match decode_component(bytes, next) {
                Some(v) => v,
                None => {
                    debug!(at = next, len = bytes.len(), "polyline_decode_failed");
                    return Self::empty();
                }
            };
            lat += d_lat;
            lng += d_lng;
            idx = next;
            points.push(Coordinate::new(lat as f64 * 1e-5, lng as f64 * 1e-5));
        }

        Self::new(points)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of vertices in the decoded sequence
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Full decoded vertex sequence
    #[inline]
    pub fn source(&self) -> &[Coordinate] {
        &self.points
    }

    /// Untravelled remainder: the view derived from the latest on-route
    /// fix, or the whole route before one lands
    #[inline]
    pub fn remaining(&self) -> &[Coordinate] {
        self.remaining.as_deref().unwrap_or(&self.points)
    }

    /// Length of the untravelled remainder, in meters
    pub fn remaining_meters(&self) -> f64 {
        self.remaining().windows(2).map(|w| distance_meters(w[0], w[1])).sum()
    }

    /// Derive the remainder view for one position fix.
    ///
    /// The fix is measured against every source segment. Within
    /// `threshold_m` of the closest one, the view becomes the fix
    /// followed by the source vertices from the nearest vertex onward;
    /// farther than that the fix is off route and the view falls back
    /// to the whole route. Each fix is judged against the full decoded
    /// sequence, so a fix behind an earlier one regrows the view.
    pub fn snap_and_trim(&mut self, position: Coordinate, threshold_m: f64) -> SnapResult {
        if self.points.len() < 2 {
            return SnapResult::NoRoute;
        }

        let (first_proj, _) = project_onto_segment(position, self.points[0], self.points[1]);
        let mut best_d = distance_meters(position, first_proj);

        for i in 1..self.points.len() - 1 {
            let (proj, _) = project_onto_segment(position, self.points[i], self.points[i + 1]);
            let d = distance_meters(position, proj);
            if d < best_d {
                best_d = d;
            }
        }

        if best_d > threshold_m {
            self.remaining = None;
            return SnapResult::OffRoute { closest_m: best_d };
        }

        let closest = self.closest_vertex(position);
        let mut view = Vec::with_capacity(1 + self.points.len() - closest);
        view.push(position);
        view.extend_from_slice(&self.points[closest..]);
        self.remaining = Some(view);
        SnapResult::Snapped { distance_m: best_d }
    }

    /// Index of the source vertex nearest the fix; the first wins ties
    fn closest_vertex(&self, position: Coordinate) -> usize {
        let mut best = 0usize;
        let mut best_d = distance_meters(position, self.points[0]);
        for (i, &vertex) in self.points.iter().enumerate().skip(1) {
            let d = distance_meters(position, vertex);
            if d < best_d {
                best = i;
                best_d = d;
            }
        }
        best
    }
}

/// Decode one zigzag-encoded delta starting at `idx`.
///
/// Returns the delta and the index just past it, or `None` on a byte
/// outside the polyline alphabet, a truncated value or a runaway
/// continuation.
fn decode_component(bytes: &[u8], mut idx: usize) -> Option<(i64, usize)> {
    let mut acc: i64 = 0;
    let mut shift = 0u32;

    loop {
        let byte = *bytes.get(idx)?;
        if !(63..127).contains(&byte) {
            return None;
        }
        idx += 1;

        let chunk = (byte - 63) as i64;
        acc |= (chunk & 0x1f) << shift;
        if chunk & 0x20 == 0 {
            break;
        }
        shift += 5;
        if shift > 60 {
            return None;
        }
    }

    let delta = if acc & 1 != 0 { !(acc >> 1) } else { acc >> 1 };
    Some((delta, idx))
}
