//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `mqtt` - MQTT client for dispatch, location, and pricing traffic
//! - `mqtt_egress` - MQTT publisher for egress events
//! - `egress_channel` - Typed channel for MQTT egress messages
//! - `routing` - HTTP route fetch client (OSRM wire format)
//! - `archive` - Completed trip output to file (JSONL format)
//! - `snapshot` - Active trip snapshot for crash recovery
//! - `prometheus` - Prometheus metrics HTTP endpoint

pub mod archive;
pub mod egress_channel;
pub mod mqtt;
pub mod mqtt_egress;
pub mod prometheus;
pub mod routing;
pub mod snapshot;

// Re-export commonly used types
pub use egress_channel::{create_egress_channel, EgressMessage, EgressSender};
pub use mqtt_egress::MqttPublisher;
