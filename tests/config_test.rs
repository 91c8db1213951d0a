//! Integration tests for configuration loading

use std::io::Write;
use tempfile::NamedTempFile;
use trip_core::infra::Config;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[driver]
id = "driver-42"

[mqtt]
host = "test-host"
port = 1884
offers_topic = "test/offer"

[routing]
url = "http://router.test:5000/route/v1/driving"
timeout_ms = 2500
enabled = false

[wait]
grace_secs = 60
rate_per_min_usd = 0.50

[offer]
window_secs = 20

[metrics]
interval_secs = 15
prometheus_port = 9091
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.driver_id(), "driver-42");
    assert_eq!(config.mqtt_host(), "test-host");
    assert_eq!(config.mqtt_port(), 1884);
    assert_eq!(config.offers_topic(), "test/offer");
    // Unset topics keep their defaults
    assert_eq!(config.positions_topic(), "location/position");
    assert!(!config.routing_enabled());
    assert_eq!(config.routing_timeout_ms(), 2500);
    assert_eq!(config.wait_grace_secs(), 60);
    assert_eq!(config.wait_rate_per_min_usd(), 0.50);
    assert_eq!(config.offer_window_ms(), 20_000);
    assert_eq!(config.prometheus_port(), 9091);
}

#[test]
fn test_missing_sections_use_defaults() {
    let mut temp_file = NamedTempFile::new().unwrap();

    // Only the required sections; everything else falls back
    let config_content = r#"
[mqtt]
host = "localhost"
port = 1883

[routing]
url = "http://localhost:5000/route/v1/driving"
timeout_ms = 3000

[metrics]
interval_secs = 10
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.driver_id(), "driver-dev");
    assert_eq!(config.arrival_radius_m(), 100.0);
    assert_eq!(config.wait_grace_secs(), 120);
    assert_eq!(config.offer_window_ms(), 15_000);
    assert!(config.mqtt_egress_enabled());
    assert_eq!(config.mqtt_egress_decisions_topic(), "driver/decisions");
    assert_eq!(config.ping_min_interval_ms(), 1_000);
    assert_eq!(config.archive_file(), "trips.jsonl");

    let tuning = config.trip_tuning();
    assert_eq!(tuning.wait_grace_ms, 120_000);
    assert_eq!(tuning.wait_rate_per_min_usd, 0.35);
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.mqtt_host(), "localhost");
    assert_eq!(config.mqtt_port(), 1883);
    assert_eq!(config.driver_id(), "driver-dev");
}

#[test]
fn test_malformed_toml_is_rejected() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[mqtt\nhost = ").unwrap();
    temp_file.flush().unwrap();

    assert!(Config::from_file(temp_file.path()).is_err());
}
