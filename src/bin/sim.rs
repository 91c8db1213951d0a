//! Trip scenario simulator - scripted dispatch, location, and pricing traffic
//!
//! Publishes the message sequences a real shift produces so the client can
//! be exercised end to end against the embedded broker.
//!
//! Usage:
//!   cargo run --bin sim -- --list
//!   cargo run --bin sim -- --scenario pickup_dropoff
//!   cargo run --bin sim -- --scenario auto_decline --host localhost --port 1883

use chrono::{Duration as ChronoDuration, Utc};
use clap::Parser;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use serde_json::json;
use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

// Ingress topics, matching the config/dev.toml defaults
const OFFERS_TOPIC: &str = "dispatch/offer";
const POSITIONS_TOPIC: &str = "location/position";
const SURGE_TOPIC: &str = "pricing/zones";
const DISPATCH_TOPIC: &str = "dispatch/trip";
const ACTIONS_TOPIC: &str = "driver/action";

// Bentonville test geography: downtown pickup, airport-side dropoff
const PICKUP: (f64, f64) = (36.373, -94.209);
const DROPOFF: (f64, f64) = (36.385, -94.220);
const DRIVER_START: (f64, f64) = (36.365, -94.200);

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "sim")]
#[command(about = "Trip scenario simulator - publishes scripted MQTT traffic")]
struct Args {
    /// MQTT broker host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// MQTT broker port
    #[arg(long, default_value_t = 1883)]
    port: u16,

    /// Scenario to run
    #[arg(short, long, default_value = "pickup_dropoff")]
    scenario: String,

    /// List available scenarios and exit
    #[arg(long)]
    list: bool,
}

// ============================================================================
// Scenarios
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Step {
    /// Publish a ride offer with the given answer window
    Offer { window_ms: u64 },
    /// Driver UI action on the actions topic
    Accept,
    Arrived,
    StartTrip,
    Complete,
    Cancel { reason: &'static str },
    /// Dispatch push cancelling the active trip on the rider's behalf
    RiderCancel { reason: &'static str },
    /// Interpolated position samples between two points
    Drive { from: (f64, f64), to: (f64, f64), samples: u32, interval_ms: u64 },
    /// Single position fix
    Position { at: (f64, f64) },
    /// Publish a surge snapshot
    Surge,
    /// Idle
    Wait { ms: u64 },
}

struct Scenario {
    name: &'static str,
    description: &'static str,
    steps: &'static [Step],
}

const SCENARIOS: &[Scenario] = &[
    Scenario {
        name: "pickup_dropoff",
        description: "Full trip: offer, accept, drive to pickup, board, drive, complete",
        steps: &[
            Step::Position { at: DRIVER_START },
            Step::Offer { window_ms: 15_000 },
            Step::Wait { ms: 2_000 },
            Step::Accept,
            Step::Drive { from: DRIVER_START, to: PICKUP, samples: 12, interval_ms: 1_000 },
            Step::Wait { ms: 4_000 },
            Step::StartTrip,
            Step::Drive { from: PICKUP, to: DROPOFF, samples: 15, interval_ms: 1_000 },
            Step::Complete,
        ],
    },
    Scenario {
        name: "auto_decline",
        description: "Offer with a short window runs out with no driver action",
        steps: &[
            Step::Offer { window_ms: 5_000 },
            Step::Wait { ms: 7_000 },
        ],
    },
    Scenario {
        name: "long_wait",
        description: "Driver arrives and waits past the billing grace period",
        steps: &[
            Step::Position { at: DRIVER_START },
            Step::Offer { window_ms: 15_000 },
            Step::Wait { ms: 1_000 },
            Step::Accept,
            Step::Drive { from: DRIVER_START, to: PICKUP, samples: 10, interval_ms: 1_000 },
            // Grace is 120s in dev config; hold 150s to see billable seconds accrue
            Step::Wait { ms: 150_000 },
            Step::StartTrip,
            Step::Drive { from: PICKUP, to: DROPOFF, samples: 15, interval_ms: 1_000 },
            Step::Complete,
        ],
    },
    Scenario {
        name: "rider_cancel",
        description: "Rider cancels while the driver is en route to pickup",
        steps: &[
            Step::Position { at: DRIVER_START },
            Step::Offer { window_ms: 15_000 },
            Step::Wait { ms: 1_000 },
            Step::Accept,
            Step::Drive { from: DRIVER_START, to: PICKUP, samples: 5, interval_ms: 1_000 },
            Step::RiderCancel { reason: "plans changed" },
        ],
    },
    Scenario {
        name: "driver_cancel",
        description: "Driver cancels a no-show after waiting at the pickup",
        steps: &[
            Step::Position { at: DRIVER_START },
            Step::Offer { window_ms: 15_000 },
            Step::Wait { ms: 1_000 },
            Step::Accept,
            Step::Drive { from: DRIVER_START, to: PICKUP, samples: 10, interval_ms: 1_000 },
            Step::Wait { ms: 10_000 },
            Step::Cancel { reason: "rider no-show" },
        ],
    },
    Scenario {
        name: "manual_arrival",
        description: "GPS never lands inside the pickup fence; driver taps arrived",
        steps: &[
            Step::Position { at: DRIVER_START },
            Step::Offer { window_ms: 15_000 },
            Step::Wait { ms: 1_000 },
            Step::Accept,
            // Stop ~300m short of the pickup point
            Step::Drive { from: DRIVER_START, to: (36.3715, -94.2075), samples: 8, interval_ms: 1_000 },
            Step::Arrived,
            Step::Wait { ms: 3_000 },
            Step::StartTrip,
            Step::Drive { from: PICKUP, to: DROPOFF, samples: 15, interval_ms: 1_000 },
            Step::Complete,
        ],
    },
    Scenario {
        name: "surge_pulse",
        description: "Two surge snapshots a few seconds apart",
        steps: &[
            Step::Surge,
            Step::Wait { ms: 5_000 },
            Step::Surge,
        ],
    },
];

// ============================================================================
// Message Building
// ============================================================================

fn build_offer(window_ms: u64) -> String {
    let expires_at = Utc::now() + ChronoDuration::milliseconds(window_ms as i64);
    json!({
        "offer_id": format!("sim-{}", Utc::now().timestamp_millis()),
        "rider": {"name": "Ana", "rating": 4.9},
        "pickup": {"address": "100 Main St", "lat": PICKUP.0, "lng": PICKUP.1},
        "destination": {"address": "200 Elm St", "lat": DROPOFF.0, "lng": DROPOFF.1},
        "estimated_fare": 12.5,
        "estimated_distance_miles": 3.2,
        "estimated_duration_minutes": 11.0,
        "surge_multiplier": 1.0,
        "expires_at": expires_at.to_rfc3339(),
    })
    .to_string()
}

fn build_position(lat: f64, lng: f64) -> String {
    json!({
        "lat": lat,
        "lng": lng,
        "ts": Utc::now().timestamp_millis(),
    })
    .to_string()
}

fn build_action(action: &str, reason: Option<&str>) -> String {
    let mut msg = json!({ "action": action });
    if let Some(r) = reason {
        msg["reason"] = json!(r);
    }
    msg.to_string()
}

fn build_rider_cancel(reason: &str) -> String {
    json!({ "event": "rider_cancelled", "reason": reason }).to_string()
}

fn build_surge_snapshot() -> String {
    json!({
        "zones": [
            {"id": "dt-1", "zone_type": "general",
             "center": {"lat": 36.3730, "lng": -94.2090}, "multiplier": 1.8},
            {"id": "dt-2", "zone_type": "general",
             "center": {"lat": 36.3741, "lng": -94.2082}, "multiplier": 1.5},
            {"id": "xna", "zone_type": "airport", "code": "XNA",
             "center": {"lat": 36.2819, "lng": -94.3068}, "multiplier": 2.2,
             "polygon": [
                 {"lat": 36.2870, "lng": -94.3130},
                 {"lat": 36.2870, "lng": -94.3000},
                 {"lat": 36.2760, "lng": -94.3000},
                 {"lat": 36.2760, "lng": -94.3130}
             ]},
            {"id": "sq-1", "zone_type": "general",
             "center": {"lat": 36.3500, "lng": -94.2200}, "multiplier": 1.1}
        ]
    })
    .to_string()
}

// ============================================================================
// Scenario Execution
// ============================================================================

async fn publish(client: &AsyncClient, topic: &str, qos: QoS, payload: String) {
    if let Err(e) = client.publish(topic, qos, false, payload).await {
        eprintln!("publish failed on {}: {}", topic, e);
    }
}

async fn run_step(client: &AsyncClient, step: &Step) {
    match step {
        Step::Offer { window_ms } => {
            println!("-> offer (window {}ms)", window_ms);
            publish(client, OFFERS_TOPIC, QoS::AtLeastOnce, build_offer(*window_ms)).await;
        }
        Step::Accept => {
            println!("-> accept");
            publish(client, ACTIONS_TOPIC, QoS::AtLeastOnce, build_action("accept", None)).await;
        }
        Step::Arrived => {
            println!("-> arrived");
            publish(client, ACTIONS_TOPIC, QoS::AtLeastOnce, build_action("arrived", None)).await;
        }
        Step::StartTrip => {
            println!("-> start_trip");
            publish(client, ACTIONS_TOPIC, QoS::AtLeastOnce, build_action("start_trip", None)).await;
        }
        Step::Complete => {
            println!("-> complete_trip");
            publish(client, ACTIONS_TOPIC, QoS::AtLeastOnce, build_action("complete_trip", None))
                .await;
        }
        Step::Cancel { reason } => {
            println!("-> cancel ({})", reason);
            publish(client, ACTIONS_TOPIC, QoS::AtLeastOnce, build_action("cancel", Some(reason)))
                .await;
        }
        Step::RiderCancel { reason } => {
            println!("-> rider_cancelled ({})", reason);
            publish(client, DISPATCH_TOPIC, QoS::AtLeastOnce, build_rider_cancel(reason)).await;
        }
        Step::Drive { from, to, samples, interval_ms } => {
            println!("-> drive {:?} to {:?} ({} samples)", from, to, samples);
            for i in 1..=*samples {
                let t = f64::from(i) / f64::from(*samples);
                let lat = from.0 + (to.0 - from.0) * t;
                let lng = from.1 + (to.1 - from.1) * t;
                publish(client, POSITIONS_TOPIC, QoS::AtMostOnce, build_position(lat, lng)).await;
                tokio::time::sleep(Duration::from_millis(*interval_ms)).await;
            }
        }
        Step::Position { at } => {
            println!("-> position {:?}", at);
            publish(client, POSITIONS_TOPIC, QoS::AtMostOnce, build_position(at.0, at.1)).await;
        }
        Step::Surge => {
            println!("-> surge snapshot");
            publish(client, SURGE_TOPIC, QoS::AtMostOnce, build_surge_snapshot()).await;
        }
        Step::Wait { ms } => {
            println!("   wait {}ms", ms);
            tokio::time::sleep(Duration::from_millis(*ms)).await;
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if args.list {
        println!("Available scenarios:");
        for s in SCENARIOS {
            println!("  {:<16} {}", s.name, s.description);
        }
        return;
    }

    let Some(scenario) = SCENARIOS.iter().find(|s| s.name == args.scenario) else {
        eprintln!("unknown scenario '{}'; try --list", args.scenario);
        std::process::exit(1);
    };

    let client_id = format!("trip-sim-{}", std::process::id());
    let mut mqttoptions = MqttOptions::new(client_id, &args.host, args.port);
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 64);

    // Drive the eventloop in the background; the sim only publishes
    tokio::spawn(async move {
        loop {
            if let Err(e) = eventloop.poll().await {
                eprintln!("mqtt error: {}", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    });

    println!("running '{}' against {}:{}", scenario.name, args.host, args.port);
    for step in scenario.steps {
        run_step(&client, step).await;
    }

    // Let QoS 1 publishes flush before dropping the client
    tokio::time::sleep(Duration::from_millis(500)).await;
    println!("scenario '{}' complete", scenario.name);
}
