//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally—these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Trip state values for the Prometheus gauge
pub const TRIP_STATE_IDLE: u64 = 0;
pub const TRIP_STATE_EN_ROUTE: u64 = 1;
pub const TRIP_STATE_AT_PICKUP: u64 = 2;
pub const TRIP_STATE_IN_TRIP: u64 = 3;

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics.
/// The `report()` method atomically swaps counters to get a consistent snapshot.
pub struct Metrics {
    /// Total events ever processed (monotonic)
    events_total: AtomicU64,
    /// Events since last report (reset on report)
    events_since_report: AtomicU64,
    /// Sum of latencies in microseconds (reset on report)
    latency_sum_us: AtomicU64,
    /// Max latency in microseconds (reset on report)
    latency_max_us: AtomicU64,
    /// Event processing latency histogram buckets (reset on report)
    latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Ride offers received (monotonic)
    offers_received_total: AtomicU64,
    /// Offers the driver accepted (monotonic)
    offers_accepted_total: AtomicU64,
    /// Offers declined for any reason (monotonic)
    offers_declined_total: AtomicU64,
    /// Subset of declines caused by countdown expiry (monotonic)
    offers_auto_declined_total: AtomicU64,
    /// Pending offers displaced by a newer offer (monotonic)
    offers_superseded_total: AtomicU64,
    /// Trips completed (monotonic)
    trips_completed_total: AtomicU64,
    /// Trips cancelled by either party (monotonic)
    trips_cancelled_total: AtomicU64,
    /// Lifecycle transitions rejected as illegal (monotonic)
    transitions_rejected_total: AtomicU64,
    /// Routes fetched from the routing service (monotonic)
    routes_fetched_total: AtomicU64,
    /// Straight-line fallbacks substituted for failed fetches (monotonic)
    route_fallbacks_total: AtomicU64,
    /// GPS position samples processed (monotonic)
    positions_total: AtomicU64,
    /// Position samples beyond the snap radius (monotonic)
    off_route_total: AtomicU64,
    /// Throttled location pings sent (monotonic)
    location_pings_total: AtomicU64,
    /// Surge zone snapshots ingested (monotonic)
    surge_snapshots_total: AtomicU64,
    /// Surge zones dropped during sanitization (monotonic)
    surge_zones_dropped_total: AtomicU64,
    /// Inbound MQTT payloads that failed to parse (monotonic)
    ingress_parse_failures: AtomicU64,
    /// Inbound events dropped due to channel full (monotonic)
    ingress_events_dropped: AtomicU64,
    /// Wait periods that ran past the free grace window (monotonic)
    wait_grace_exceeded_total: AtomicU64,
    /// Current trip state (0=idle, 1=en_route, 2=at_pickup, 3=in_trip)
    trip_state: AtomicU64,
    /// Whether an offer is awaiting a decision (0/1)
    offer_pending: AtomicU64,
    /// Current event queue depth (updated by sampler)
    event_queue_depth: AtomicU64,
    /// Last report time (only accessed from reporter, not atomic)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            events_total: AtomicU64::new(0),
            events_since_report: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            offers_received_total: AtomicU64::new(0),
            offers_accepted_total: AtomicU64::new(0),
            offers_declined_total: AtomicU64::new(0),
            offers_auto_declined_total: AtomicU64::new(0),
            offers_superseded_total: AtomicU64::new(0),
            trips_completed_total: AtomicU64::new(0),
            trips_cancelled_total: AtomicU64::new(0),
            transitions_rejected_total: AtomicU64::new(0),
            routes_fetched_total: AtomicU64::new(0),
            route_fallbacks_total: AtomicU64::new(0),
            positions_total: AtomicU64::new(0),
            off_route_total: AtomicU64::new(0),
            location_pings_total: AtomicU64::new(0),
            surge_snapshots_total: AtomicU64::new(0),
            surge_zones_dropped_total: AtomicU64::new(0),
            ingress_parse_failures: AtomicU64::new(0),
            ingress_events_dropped: AtomicU64::new(0),
            wait_grace_exceeded_total: AtomicU64::new(0),
            trip_state: AtomicU64::new(TRIP_STATE_IDLE),
            offer_pending: AtomicU64::new(0),
            event_queue_depth: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record an event was processed with given latency (lock-free)
    #[inline]
    pub fn record_event_processed(&self, latency_us: u64) {
        self.events_total.fetch_add(1, Ordering::Relaxed);
        self.events_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);

        // Update histogram bucket
        let bucket = bucket_index(latency_us);
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);

        // Update max
        update_atomic_max(&self.latency_max_us, latency_us);
    }

    /// Record a ride offer received (lock-free)
    #[inline]
    pub fn record_offer_received(&self) {
        self.offers_received_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an offer accepted (lock-free)
    #[inline]
    pub fn record_offer_accepted(&self) {
        self.offers_accepted_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an offer declined; `auto` marks countdown expiry (lock-free)
    #[inline]
    pub fn record_offer_declined(&self, auto: bool) {
        self.offers_declined_total.fetch_add(1, Ordering::Relaxed);
        if auto {
            self.offers_auto_declined_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a pending offer displaced by a newer one (lock-free)
    #[inline]
    pub fn record_offer_superseded(&self) {
        self.offers_superseded_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a trip completed (lock-free)
    #[inline]
    pub fn record_trip_completed(&self) {
        self.trips_completed_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a trip cancelled (lock-free)
    #[inline]
    pub fn record_trip_cancelled(&self) {
        self.trips_cancelled_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an illegal lifecycle transition attempt (lock-free)
    #[inline]
    pub fn record_transition_rejected(&self) {
        self.transitions_rejected_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful route fetch (lock-free)
    #[inline]
    pub fn record_route_fetched(&self) {
        self.routes_fetched_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a straight-line fallback route (lock-free)
    #[inline]
    pub fn record_route_fallback(&self) {
        self.route_fallbacks_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a GPS position sample processed (lock-free)
    #[inline]
    pub fn record_position(&self) {
        self.positions_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a position sample beyond the snap radius (lock-free)
    #[inline]
    pub fn record_off_route(&self) {
        self.off_route_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an outbound location ping (lock-free)
    #[inline]
    pub fn record_location_ping(&self) {
        self.location_pings_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a surge snapshot with how many zones sanitization dropped (lock-free)
    #[inline]
    pub fn record_surge_snapshot(&self, zones_dropped: u64) {
        self.surge_snapshots_total.fetch_add(1, Ordering::Relaxed);
        if zones_dropped > 0 {
            self.surge_zones_dropped_total.fetch_add(zones_dropped, Ordering::Relaxed);
        }
    }

    /// Record an inbound payload that failed to parse (lock-free)
    #[inline]
    pub fn record_parse_failure(&self) {
        self.ingress_parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an inbound event dropped due to channel full (lock-free)
    #[inline]
    pub fn record_ingress_dropped(&self) {
        self.ingress_events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a wait period running past the grace window (lock-free)
    #[inline]
    pub fn record_wait_grace_exceeded(&self) {
        self.wait_grace_exceeded_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Set current trip state gauge
    #[inline]
    pub fn set_trip_state(&self, state: u64) {
        self.trip_state.store(state, Ordering::Relaxed);
    }

    /// Get current trip state gauge
    #[inline]
    #[allow(dead_code)]
    pub fn trip_state(&self) -> u64 {
        self.trip_state.load(Ordering::Relaxed)
    }

    /// Set whether an offer is pending a decision
    #[inline]
    pub fn set_offer_pending(&self, pending: bool) {
        self.offer_pending.store(u64::from(pending), Ordering::Relaxed);
    }

    /// Set current event queue depth (called by sampler)
    #[inline]
    pub fn set_event_queue_depth(&self, depth: u64) {
        self.event_queue_depth.store(depth, Ordering::Relaxed);
    }

    /// Get current event queue depth
    #[inline]
    pub fn event_queue_depth(&self) -> u64 {
        self.event_queue_depth.load(Ordering::Relaxed)
    }

    /// Get total events processed
    #[inline]
    #[allow(dead_code)]
    pub fn events_total(&self) -> u64 {
        self.events_total.load(Ordering::Relaxed)
    }

    /// Get total inbound events dropped
    #[inline]
    #[allow(dead_code)]
    pub fn ingress_events_dropped(&self) -> u64 {
        self.ingress_events_dropped.load(Ordering::Relaxed)
    }

    /// Calculate and return metrics summary, then reset periodic counters
    ///
    /// This is the only method that resets counters. It uses atomic swap
    /// to get a consistent snapshot while allowing concurrent updates.
    pub fn report(&self) -> MetricsSummary {
        // Swap periodic counters to zero and get their values
        let events_count = self.events_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let max_latency = self.latency_max_us.swap(0, Ordering::Relaxed);

        // Swap histogram buckets and collect values
        let lat_buckets = swap_buckets(&self.latency_buckets);

        // Calculate elapsed time and reset
        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        // Calculate derived metrics
        let events_per_sec = if elapsed.as_secs_f64() > 0.0 {
            events_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        let avg_latency = if events_count > 0 { latency_sum / events_count } else { 0 };

        // Compute percentiles from histogram
        let lat_p50 = percentile_from_buckets(&lat_buckets, 0.50);
        let lat_p95 = percentile_from_buckets(&lat_buckets, 0.95);
        let lat_p99 = percentile_from_buckets(&lat_buckets, 0.99);

        MetricsSummary {
            events_total: self.events_total.load(Ordering::Relaxed),
            events_per_sec,
            avg_process_latency_us: avg_latency,
            max_process_latency_us: max_latency,
            lat_buckets,
            lat_p50_us: lat_p50,
            lat_p95_us: lat_p95,
            lat_p99_us: lat_p99,
            offers_received_total: self.offers_received_total.load(Ordering::Relaxed),
            offers_accepted_total: self.offers_accepted_total.load(Ordering::Relaxed),
            offers_declined_total: self.offers_declined_total.load(Ordering::Relaxed),
            offers_auto_declined_total: self.offers_auto_declined_total.load(Ordering::Relaxed),
            offers_superseded_total: self.offers_superseded_total.load(Ordering::Relaxed),
            trips_completed_total: self.trips_completed_total.load(Ordering::Relaxed),
            trips_cancelled_total: self.trips_cancelled_total.load(Ordering::Relaxed),
            transitions_rejected_total: self.transitions_rejected_total.load(Ordering::Relaxed),
            routes_fetched_total: self.routes_fetched_total.load(Ordering::Relaxed),
            route_fallbacks_total: self.route_fallbacks_total.load(Ordering::Relaxed),
            positions_total: self.positions_total.load(Ordering::Relaxed),
            off_route_total: self.off_route_total.load(Ordering::Relaxed),
            location_pings_total: self.location_pings_total.load(Ordering::Relaxed),
            surge_snapshots_total: self.surge_snapshots_total.load(Ordering::Relaxed),
            surge_zones_dropped_total: self.surge_zones_dropped_total.load(Ordering::Relaxed),
            ingress_parse_failures: self.ingress_parse_failures.load(Ordering::Relaxed),
            ingress_events_dropped: self.ingress_events_dropped.load(Ordering::Relaxed),
            wait_grace_exceeded_total: self.wait_grace_exceeded_total.load(Ordering::Relaxed),
            trip_state: self.trip_state.load(Ordering::Relaxed),
            offer_pending: self.offer_pending.load(Ordering::Relaxed),
            event_queue_depth: self.event_queue_depth.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of histogram buckets (exported for formatting)
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Exported bucket bounds for Prometheus formatting
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;

#[derive(Debug)]
#[allow(dead_code)]
pub struct MetricsSummary {
    pub events_total: u64,
    pub events_per_sec: f64,
    pub avg_process_latency_us: u64,
    pub max_process_latency_us: u64,
    /// Event processing latency histogram buckets
    /// Bounds: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200 µs
    pub lat_buckets: [u64; NUM_BUCKETS],
    /// 50th percentile latency (µs)
    pub lat_p50_us: u64,
    /// 95th percentile latency (µs)
    pub lat_p95_us: u64,
    /// 99th percentile latency (µs)
    pub lat_p99_us: u64,
    pub offers_received_total: u64,
    pub offers_accepted_total: u64,
    pub offers_declined_total: u64,
    pub offers_auto_declined_total: u64,
    pub offers_superseded_total: u64,
    pub trips_completed_total: u64,
    pub trips_cancelled_total: u64,
    pub transitions_rejected_total: u64,
    pub routes_fetched_total: u64,
    pub route_fallbacks_total: u64,
    pub positions_total: u64,
    pub off_route_total: u64,
    pub location_pings_total: u64,
    pub surge_snapshots_total: u64,
    pub surge_zones_dropped_total: u64,
    pub ingress_parse_failures: u64,
    pub ingress_events_dropped: u64,
    pub wait_grace_exceeded_total: u64,
    /// Current trip state (0=idle, 1=en_route, 2=at_pickup, 3=in_trip)
    pub trip_state: u64,
    /// Whether an offer is awaiting a decision (0/1)
    pub offer_pending: u64,
    /// Current event queue depth (snapshot)
    pub event_queue_depth: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            events_total = %self.events_total,
            events_per_sec = format!("{:.1}", self.events_per_sec),
            avg_latency_us = %self.avg_process_latency_us,
            max_latency_us = %self.max_process_latency_us,
            p50_us = %self.lat_p50_us,
            p95_us = %self.lat_p95_us,
            p99_us = %self.lat_p99_us,
            offers = %self.offers_received_total,
            accepted = %self.offers_accepted_total,
            declined = %self.offers_declined_total,
            completed = %self.trips_completed_total,
            cancelled = %self.trips_cancelled_total,
            trip_state = %self.trip_state,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.events_total(), 0);
        assert_eq!(metrics.trip_state(), TRIP_STATE_IDLE);
    }

    #[test]
    fn test_record_event() {
        let metrics = Metrics::new();

        metrics.record_event_processed(100);
        assert_eq!(metrics.events_total(), 1);
        assert_eq!(metrics.latency_sum_us.load(Ordering::Relaxed), 100);

        metrics.record_event_processed(200);
        assert_eq!(metrics.events_total(), 2);
        assert_eq!(metrics.latency_sum_us.load(Ordering::Relaxed), 300);
    }

    #[test]
    fn test_offer_counters() {
        let metrics = Metrics::new();

        metrics.record_offer_received();
        metrics.record_offer_received();
        metrics.record_offer_received();
        metrics.record_offer_accepted();
        metrics.record_offer_declined(false);
        metrics.record_offer_declined(true);
        metrics.record_offer_superseded();

        let summary = metrics.report();
        assert_eq!(summary.offers_received_total, 3);
        assert_eq!(summary.offers_accepted_total, 1);
        assert_eq!(summary.offers_declined_total, 2);
        assert_eq!(summary.offers_auto_declined_total, 1);
        assert_eq!(summary.offers_superseded_total, 1);
    }

    #[test]
    fn test_report() {
        let metrics = Metrics::new();

        metrics.record_event_processed(100);
        metrics.record_event_processed(200);
        metrics.record_event_processed(300);
        metrics.record_trip_completed();

        let summary = metrics.report();

        assert_eq!(summary.events_total, 3);
        assert_eq!(summary.avg_process_latency_us, 200); // (100+200+300)/3
        assert_eq!(summary.max_process_latency_us, 300);
        assert_eq!(summary.trips_completed_total, 1);

        // Periodic counters should be reset
        assert_eq!(metrics.events_since_report.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.latency_sum_us.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.latency_max_us.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_report_empty() {
        let metrics = Metrics::new();
        let summary = metrics.report();

        assert_eq!(summary.events_total, 0);
        assert_eq!(summary.avg_process_latency_us, 0);
        assert_eq!(summary.max_process_latency_us, 0);
    }

    #[test]
    fn test_max_latency_tracking() {
        let metrics = Metrics::new();

        metrics.record_event_processed(100);
        metrics.record_event_processed(500);
        metrics.record_event_processed(200);
        metrics.record_event_processed(50);

        assert_eq!(metrics.latency_max_us.load(Ordering::Relaxed), 500);
    }

    #[test]
    fn test_trip_state_gauge() {
        let metrics = Metrics::new();
        assert_eq!(metrics.trip_state(), TRIP_STATE_IDLE);

        metrics.set_trip_state(TRIP_STATE_EN_ROUTE);
        assert_eq!(metrics.trip_state(), TRIP_STATE_EN_ROUTE);

        metrics.set_trip_state(TRIP_STATE_IN_TRIP);
        let summary = metrics.report();
        assert_eq!(summary.trip_state, TRIP_STATE_IN_TRIP);
    }

    #[test]
    fn test_concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let metrics = Arc::new(Metrics::new());
        let mut handles = vec![];

        // Spawn 10 threads, each recording 1000 events
        for _ in 0..10 {
            let m = metrics.clone();
            handles.push(thread::spawn(move || {
                for i in 0..1000 {
                    m.record_event_processed(i as u64);
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(metrics.events_total(), 10_000);
    }

    #[test]
    fn test_bucket_index() {
        // Test bucket boundaries
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(100), 0);
        assert_eq!(bucket_index(101), 1);
        assert_eq!(bucket_index(200), 1);
        assert_eq!(bucket_index(201), 2);
        assert_eq!(bucket_index(400), 2);
        assert_eq!(bucket_index(51200), 9);
        assert_eq!(bucket_index(51201), 10); // overflow
        assert_eq!(bucket_index(100000), 10);
    }

    #[test]
    fn test_histogram_buckets() {
        let metrics = Metrics::new();

        // Record events in different buckets
        metrics.record_event_processed(50); // bucket 0 (≤100)
        metrics.record_event_processed(150); // bucket 1 (≤200)
        metrics.record_event_processed(350); // bucket 2 (≤400)
        metrics.record_event_processed(60000); // bucket 10 (overflow)

        let summary = metrics.report();

        assert_eq!(summary.lat_buckets[0], 1);
        assert_eq!(summary.lat_buckets[1], 1);
        assert_eq!(summary.lat_buckets[2], 1);
        assert_eq!(summary.lat_buckets[10], 1);
    }

    #[test]
    fn test_percentile_computation() {
        let metrics = Metrics::new();

        // Record 100 events, all at 150µs (bucket 1, ≤200)
        for _ in 0..100 {
            metrics.record_event_processed(150);
        }

        let summary = metrics.report();

        // All percentiles should be 200 (upper bound of bucket 1)
        assert_eq!(summary.lat_p50_us, 200);
        assert_eq!(summary.lat_p95_us, 200);
        assert_eq!(summary.lat_p99_us, 200);
    }

    #[test]
    fn test_surge_snapshot_drops() {
        let metrics = Metrics::new();

        metrics.record_surge_snapshot(0);
        metrics.record_surge_snapshot(3);

        let summary = metrics.report();
        assert_eq!(summary.surge_snapshots_total, 2);
        assert_eq!(summary.surge_zones_dropped_total, 3);
    }
}
