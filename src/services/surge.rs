//! Surge zone aggregation - hotspot clustering and map label selection
//!
//! The pricing feed publishes full zone snapshots. Both consumers run
//! off one greedy clustering pass, parameterized by a minimum
//! multiplier and a degree epsilon:
//! - hotspots merge nearby high-surge zones into a multiplier-weighted
//!   centroid for the heat overlay
//! - labels pick the strongest zone per neighborhood, suppressing
//!   anything within the spacing epsilon of an already-chosen label
//!
//! Multipliers are sanitized on ingest and output order is
//! deterministic: strongest first, ties by zone id.

use crate::domain::types::{Coordinate, SurgeZone, ZoneKind};
use tracing::{debug, info};

/// Contract bounds for surge multipliers; anything outside is clamped
const MULTIPLIER_FLOOR: f64 = 1.0;
const MULTIPLIER_CEIL: f64 = 5.0;

/// Clustering thresholds, all configurable
#[derive(Debug, Clone)]
pub struct SurgeTuning {
    pub hotspot_min_multiplier: f64,
    pub hotspot_merge_epsilon_deg: f64,
    pub label_min_multiplier: f64,
    pub label_spacing_epsilon_deg: f64,
    /// Most labels allowed on airport-type zones
    pub airport_label_cap: usize,
}

impl Default for SurgeTuning {
    fn default() -> Self {
        Self {
            hotspot_min_multiplier: 1.5,
            hotspot_merge_epsilon_deg: 0.02,
            label_min_multiplier: 1.25,
            label_spacing_epsilon_deg: 0.02,
            airport_label_cap: 3,
        }
    }
}

/// What an ingest pass did with the snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestSummary {
    pub accepted: usize,
    pub clamped: usize,
    pub dropped: usize,
}

/// Merged high-surge cluster for the heat overlay
#[derive(Debug, Clone, PartialEq)]
pub struct Hotspot {
    /// Multiplier-weighted centroid of the member zones
    pub center: Coordinate,
    /// Strongest member multiplier
    pub multiplier: f64,
    /// Member zone ids, strongest first
    pub zone_ids: Vec<String>,
}

/// One selected map label
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneLabel {
    pub zone_id: String,
    pub code: Option<String>,
    pub center: Coordinate,
    pub multiplier: f64,
    pub kind: ZoneKind,
}

/// Current surge picture, rebuilt from each pricing snapshot
pub struct SurgeBoard {
    zones: Vec<SurgeZone>,
    tuning: SurgeTuning,
    last_ingest_ms: Option<u64>,
}

impl SurgeBoard {
    pub fn new(tuning: SurgeTuning) -> Self {
        Self { zones: Vec::new(), tuning, last_ingest_ms: None }
    }

    /// Replace the zone set with a sanitized snapshot.
    ///
    /// Zones with non-finite multipliers or coordinates are dropped;
    /// finite multipliers are clamped into the contract bounds. Zones
    /// are stored sorted by id so downstream output does not depend on
    /// feed order.
    pub fn ingest(&mut self, zones: Vec<SurgeZone>, now_ms: u64) -> IngestSummary {
        let mut summary = IngestSummary::default();
        let mut kept: Vec<SurgeZone> = Vec::with_capacity(zones.len());

        for mut zone in zones {
            if !zone.multiplier.is_finite()
                || !zone.center.lat.is_finite()
                || !zone.center.lng.is_finite()
            {
                debug!(zone_id = %zone.id, "surge_zone_dropped");
                summary.dropped += 1;
                continue;
            }
            let clamped = zone.multiplier.clamp(MULTIPLIER_FLOOR, MULTIPLIER_CEIL);
            if clamped != zone.multiplier {
                debug!(zone_id = %zone.id, raw = %zone.multiplier, "surge_multiplier_clamped");
                zone.multiplier = clamped;
                summary.clamped += 1;
            }
            kept.push(zone);
            summary.accepted += 1;
        }

        kept.sort_by(|a, b| a.id.cmp(&b.id));
        self.zones = kept;
        self.last_ingest_ms = Some(now_ms);

        info!(
            zones = %summary.accepted,
            clamped = %summary.clamped,
            dropped = %summary.dropped,
            "surge_snapshot_ingested"
        );
        summary
    }

    #[inline]
    pub fn zone_count(&self) -> usize {
        self.zones.len()
    }

    #[cfg(test)]
    pub(crate) fn zones(&self) -> &[SurgeZone] {
        &self.zones
    }

    #[inline]
    pub fn last_ingest_ms(&self) -> Option<u64> {
        self.last_ingest_ms
    }

    /// High-surge clusters merged for the heat overlay
    pub fn hotspots(&self) -> Vec<Hotspot> {
        let clusters = cluster(
            &self.zones,
            self.tuning.hotspot_min_multiplier,
            self.tuning.hotspot_merge_epsilon_deg,
        );

        clusters
            .into_iter()
            .map(|members| {
                let weight: f64 = members.iter().map(|z| z.multiplier).sum();
                let lat = members.iter().map(|z| z.center.lat * z.multiplier).sum::<f64>() / weight;
                let lng = members.iter().map(|z| z.center.lng * z.multiplier).sum::<f64>() / weight;
                Hotspot {
                    center: Coordinate::new(lat, lng),
                    // members are strongest-first, the seed carries the max
                    multiplier: members[0].multiplier,
                    zone_ids: members.iter().map(|z| z.id.clone()).collect(),
                }
            })
            .collect()
    }

    /// Map labels: the strongest zone per neighborhood, spacing
    /// enforced by the cluster epsilon, airport labels capped
    pub fn labels(&self) -> Vec<ZoneLabel> {
        let clusters = cluster(
            &self.zones,
            self.tuning.label_min_multiplier,
            self.tuning.label_spacing_epsilon_deg,
        );

        let mut airport_count = 0usize;
        let mut labels = Vec::with_capacity(clusters.len());
        for members in clusters {
            let seed = members[0];
            if seed.zone_type == ZoneKind::Airport {
                if airport_count >= self.tuning.airport_label_cap {
                    continue;
                }
                airport_count += 1;
            }
            labels.push(ZoneLabel {
                zone_id: seed.id.clone(),
                code: seed.code.clone(),
                center: seed.center,
                multiplier: seed.multiplier,
                kind: seed.zone_type,
            });
        }
        labels
    }
}

/// Greedy clustering shared by hotspots and labels.
///
/// Zones at or above `min_multiplier` are taken strongest-first (ties
/// by id) and attached to the first cluster whose seed lies within
/// `epsilon_deg` planar distance; otherwise they seed a new cluster.
/// Each cluster comes back strongest-first with the seed at index 0,
/// so the result is never empty per cluster.
fn cluster(zones: &[SurgeZone], min_multiplier: f64, epsilon_deg: f64) -> Vec<Vec<&SurgeZone>> {
    let mut candidates: Vec<&SurgeZone> =
        zones.iter().filter(|z| z.multiplier >= min_multiplier).collect();
    candidates.sort_by(|a, b| {
        b.multiplier
            .partial_cmp(&a.multiplier)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut clusters: Vec<Vec<&SurgeZone>> = Vec::new();
    for zone in candidates {
        let slot = clusters
            .iter_mut()
            .find(|members| within_epsilon(members[0].center, zone.center, epsilon_deg));
        match slot {
            Some(members) => members.push(zone),
            None => clusters.push(vec![zone]),
        }
    }
    clusters
}

#[inline]
fn within_epsilon(a: Coordinate, b: Coordinate, epsilon_deg: f64) -> bool {
    let d_lat = a.lat - b.lat;
    let d_lng = a.lng - b.lng;
    d_lat * d_lat + d_lng * d_lng <= epsilon_deg * epsilon_deg
}
