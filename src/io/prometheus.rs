//! Prometheus metrics HTTP endpoint
//!
//! Exposes trip session metrics in Prometheus text format at /metrics.
//! Uses hyper for the HTTP server. Metrics carry a driver label so
//! multiple clients can share one scrape job.

use crate::infra::metrics::{Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write as FmtWrite;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Metric type for Prometheus exposition
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a single metric in Prometheus format
fn write_metric(
    out: &mut String,
    name: &str,
    help: &str,
    metric_type: MetricType,
    driver: &str,
    value: u64,
) {
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} {}", name, metric_type.as_str());
    let _ = writeln!(out, "{}{{driver=\"{}\"}} {}", name, driver, value);
}

/// Write a gauge with float value
fn write_gauge_f64(out: &mut String, name: &str, help: &str, driver: &str, value: f64) {
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} gauge", name);
    let _ = writeln!(out, "{}{{driver=\"{}\"}} {:.2}", name, driver, value);
}

/// Write a histogram from bucket counts
///
/// Buckets are cumulative in Prometheus format. The last bucket (+Inf)
/// equals the total count. Sum is approximated from the average since
/// the collector does not retain exact per-event values.
fn write_histogram(
    out: &mut String,
    name: &str,
    help: &str,
    driver: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    bounds: &[u64],
    avg_us: u64,
) {
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} histogram", name);

    let mut cumulative = 0u64;
    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if i < bounds.len() {
            let _ = writeln!(
                out,
                "{}_bucket{{driver=\"{}\",le=\"{}\"}} {}",
                name, driver, bounds[i], cumulative
            );
        }
    }
    let total = cumulative;
    let _ = writeln!(out, "{}_bucket{{driver=\"{}\",le=\"+Inf\"}} {}", name, driver, total);
    let _ = writeln!(out, "{}_sum{{driver=\"{}\"}} {}", name, driver, avg_us.saturating_mul(total));
    let _ = writeln!(out, "{}_count{{driver=\"{}\"}} {}", name, driver, total);
}

fn write_event_metrics(out: &mut String, summary: &MetricsSummary, driver: &str) {
    write_metric(
        out,
        "trip_events_total",
        "Total events processed by the trip session",
        MetricType::Counter,
        driver,
        summary.events_total,
    );
    write_gauge_f64(
        out,
        "trip_events_per_sec",
        "Events processed per second since last report",
        driver,
        summary.events_per_sec,
    );
    write_histogram(
        out,
        "trip_event_latency_us",
        "Event processing latency in microseconds",
        driver,
        &summary.lat_buckets,
        &METRICS_BUCKET_BOUNDS,
        summary.avg_process_latency_us,
    );
    write_metric(
        out,
        "trip_event_latency_p50_us",
        "50th percentile event processing latency (microseconds)",
        MetricType::Gauge,
        driver,
        summary.lat_p50_us,
    );
    write_metric(
        out,
        "trip_event_latency_p95_us",
        "95th percentile event processing latency (microseconds)",
        MetricType::Gauge,
        driver,
        summary.lat_p95_us,
    );
    write_metric(
        out,
        "trip_event_latency_p99_us",
        "99th percentile event processing latency (microseconds)",
        MetricType::Gauge,
        driver,
        summary.lat_p99_us,
    );
    write_metric(
        out,
        "trip_event_queue_depth",
        "Current depth of the inbound event queue",
        MetricType::Gauge,
        driver,
        summary.event_queue_depth,
    );
}

fn write_offer_metrics(out: &mut String, summary: &MetricsSummary, driver: &str) {
    write_metric(
        out,
        "trip_offers_received_total",
        "Ride offers received from dispatch",
        MetricType::Counter,
        driver,
        summary.offers_received_total,
    );
    write_metric(
        out,
        "trip_offers_accepted_total",
        "Ride offers accepted by the driver",
        MetricType::Counter,
        driver,
        summary.offers_accepted_total,
    );
    write_metric(
        out,
        "trip_offers_declined_total",
        "Ride offers declined for any reason",
        MetricType::Counter,
        driver,
        summary.offers_declined_total,
    );
    write_metric(
        out,
        "trip_offers_auto_declined_total",
        "Ride offers auto-declined on countdown expiry",
        MetricType::Counter,
        driver,
        summary.offers_auto_declined_total,
    );
    write_metric(
        out,
        "trip_offers_superseded_total",
        "Pending offers displaced by a newer offer",
        MetricType::Counter,
        driver,
        summary.offers_superseded_total,
    );
    write_metric(
        out,
        "trip_offer_pending",
        "Whether an offer is awaiting a decision (0/1)",
        MetricType::Gauge,
        driver,
        summary.offer_pending,
    );
}

fn write_trip_metrics(out: &mut String, summary: &MetricsSummary, driver: &str) {
    write_metric(
        out,
        "trip_completed_total",
        "Trips completed",
        MetricType::Counter,
        driver,
        summary.trips_completed_total,
    );
    write_metric(
        out,
        "trip_cancelled_total",
        "Trips cancelled by driver or rider",
        MetricType::Counter,
        driver,
        summary.trips_cancelled_total,
    );
    write_metric(
        out,
        "trip_transitions_rejected_total",
        "Lifecycle transitions rejected as illegal",
        MetricType::Counter,
        driver,
        summary.transitions_rejected_total,
    );
    write_metric(
        out,
        "trip_wait_grace_exceeded_total",
        "Pickup waits that ran past the free grace period",
        MetricType::Counter,
        driver,
        summary.wait_grace_exceeded_total,
    );
    write_metric(
        out,
        "trip_state",
        "Current trip state (0=idle, 1=en_route, 2=at_pickup, 3=in_trip)",
        MetricType::Gauge,
        driver,
        summary.trip_state,
    );
}

fn write_route_metrics(out: &mut String, summary: &MetricsSummary, driver: &str) {
    write_metric(
        out,
        "trip_routes_fetched_total",
        "Routes fetched from the routing service",
        MetricType::Counter,
        driver,
        summary.routes_fetched_total,
    );
    write_metric(
        out,
        "trip_route_fallbacks_total",
        "Straight-line fallbacks substituted for failed route fetches",
        MetricType::Counter,
        driver,
        summary.route_fallbacks_total,
    );
}

fn write_position_metrics(out: &mut String, summary: &MetricsSummary, driver: &str) {
    write_metric(
        out,
        "trip_positions_total",
        "GPS position samples processed",
        MetricType::Counter,
        driver,
        summary.positions_total,
    );
    write_metric(
        out,
        "trip_off_route_total",
        "Position samples beyond the route snap radius",
        MetricType::Counter,
        driver,
        summary.off_route_total,
    );
    write_metric(
        out,
        "trip_location_pings_total",
        "Throttled location pings published",
        MetricType::Counter,
        driver,
        summary.location_pings_total,
    );
}

fn write_surge_metrics(out: &mut String, summary: &MetricsSummary, driver: &str) {
    write_metric(
        out,
        "trip_surge_snapshots_total",
        "Surge zone snapshots ingested",
        MetricType::Counter,
        driver,
        summary.surge_snapshots_total,
    );
    write_metric(
        out,
        "trip_surge_zones_dropped_total",
        "Surge zones dropped during sanitization",
        MetricType::Counter,
        driver,
        summary.surge_zones_dropped_total,
    );
}

fn write_ingress_metrics(out: &mut String, summary: &MetricsSummary, driver: &str) {
    write_metric(
        out,
        "trip_ingress_parse_failures_total",
        "Inbound payloads that failed to parse",
        MetricType::Counter,
        driver,
        summary.ingress_parse_failures,
    );
    write_metric(
        out,
        "trip_ingress_events_dropped_total",
        "Inbound events dropped because the queue was full",
        MetricType::Counter,
        driver,
        summary.ingress_events_dropped,
    );
}

/// Format a metrics summary as Prometheus text exposition format
fn format_prometheus_metrics(summary: &MetricsSummary, driver: &str) -> String {
    let mut out = String::with_capacity(4096);

    write_event_metrics(&mut out, summary, driver);
    write_offer_metrics(&mut out, summary, driver);
    write_trip_metrics(&mut out, summary, driver);
    write_route_metrics(&mut out, summary, driver);
    write_position_metrics(&mut out, summary, driver);
    write_surge_metrics(&mut out, summary, driver);
    write_ingress_metrics(&mut out, summary, driver);

    out
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    driver_id: String,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let summary = metrics.report();
            let body = format_prometheus_metrics(&summary, &driver_id);
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(body)))
                .unwrap_or_default())
        }
        (&Method::GET, "/health") => Ok(Response::builder()
            .status(StatusCode::OK)
            .body(Full::new(Bytes::from("ok")))
            .unwrap_or_default()),
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("not found")))
            .unwrap_or_default()),
    }
}

/// Start the Prometheus metrics HTTP server
///
/// Runs until the shutdown signal fires. Each connection is served on
/// its own task so a slow scraper cannot block accepts.
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    driver_id: String,
    mut shutdown: watch::Receiver<bool>,
) {
    let addr = format!("0.0.0.0:{}", port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(addr = %addr, error = %e, "metrics_server_bind_failed");
            return;
        }
    };

    info!(addr = %addr, "metrics_server_started");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        debug!(peer = %peer, "metrics_connection_accepted");
                        let metrics = metrics.clone();
                        let driver_id = driver_id.clone();
                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let service = service_fn(move |req| {
                                handle_request(req, metrics.clone(), driver_id.clone())
                            });
                            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                                debug!(error = %e, "metrics_connection_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "metrics_accept_failed");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("metrics_server_stopped");
                    break;
                }
            }
        }
    }
}
