//! trip-core - Driver-side active trip coordination
//!
//! Owns the ride lifecycle between dispatch and the driver's app shell:
//! offer windows, pickup arrival and wait billing, route snapping, and
//! surge map rendering, all on a single event loop.
//!
//! Module structure:
//! - `domain/` - Core business types (Trip, RideOffer, Events)
//! - `geo/` - Haversine distance and polyline snapping
//! - `io/` - External interfaces (MQTT, Routing, Archive, Prometheus)
//! - `services/` - Business logic (Session, TripMachine, Surge)
//! - `infra/` - Infrastructure (Config, Metrics, Broker)

use clap::Parser;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;
use trip_core::infra::{Config, Metrics};
use trip_core::io::routing::{HttpRouteClient, RouteClient};
use trip_core::io::{create_egress_channel, MqttPublisher};
use trip_core::services::TripSession;

/// trip-core - Driver-side active trip coordination service
#[derive(Parser, Debug)]
#[command(name = "trip-core", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(git_hash = env!("GIT_HASH"), "trip-core starting");

    // Parse command line arguments using clap
    let args = Args::parse();

    // Load configuration from TOML file (needed for broker config)
    let config = Config::load_from_path(&args.config);

    // Start embedded MQTT broker with config
    trip_core::infra::broker::start_embedded_broker(&config);

    // Log configuration
    info!(
        config_file = %config.config_file(),
        driver_id = %config.driver_id(),
        mqtt_host = %config.mqtt_host(),
        mqtt_port = %config.mqtt_port(),
        routing_url = %config.routing_url(),
        routing_enabled = %config.routing_enabled(),
        arrival_radius_m = %config.arrival_radius_m(),
        wait_grace_secs = %config.wait_grace_secs(),
        offer_window_ms = %config.offer_window_ms(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Create shared components
    let metrics = Arc::new(Metrics::new());
    let routes: Arc<dyn RouteClient> = Arc::new(HttpRouteClient::new(
        config.routing_url(),
        config.routing_timeout_ms(),
    )?);

    // Create event channel (bounded for backpressure)
    let (event_tx, event_rx) = mpsc::channel(1000);

    // Start MQTT client
    let mqtt_config = config.clone();
    let mqtt_tx = event_tx.clone();
    let mqtt_metrics = metrics.clone();
    let mqtt_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) =
            trip_core::io::mqtt::start_mqtt_client(&mqtt_config, mqtt_tx, mqtt_metrics, mqtt_shutdown)
                .await
        {
            tracing::error!(error = %e, "MQTT client error");
        }
    });

    // Start Prometheus metrics HTTP server (if port > 0)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let prom_driver = config.driver_id().to_string();
        let prom_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            trip_core::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                prom_driver,
                prom_shutdown,
            )
            .await;
        });
    }

    // Start metrics reporter (lock-free reads with full summary)
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Create MQTT egress channel and publisher (if enabled).
    // With the publisher disabled the receiver drops and sends become no-ops.
    let (egress_sender, egress_rx) = create_egress_channel(1000, config.driver_id().to_string());
    if config.mqtt_egress_enabled() {
        let publisher = MqttPublisher::new(&config, egress_rx);
        let publisher_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            publisher.run(publisher_shutdown).await;
        });
    }

    // Create the session (main event processing loop) and reload any
    // trip that survived a restart
    let mut session = TripSession::new(config, routes, metrics, egress_sender, event_tx);
    session.rehydrate();
    info!("session_started");

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    // Run session - consumes events until the channel closes or shutdown fires
    session.run(event_rx, shutdown_rx).await;

    info!("trip-core shutdown complete");
    Ok(())
}
