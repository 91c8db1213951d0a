//! Services - business logic and state management
//!
//! This module contains the core business logic services:
//! - `session` - Central event orchestrator owning all trip state
//! - `offer` - Ride offer window, countdown, and auto-decline
//! - `trip_machine` - Active trip lifecycle state machine
//! - `wait_billing` - Pickup wait grace period and billing meter
//! - `surge` - Surge snapshot clustering and label placement

pub mod offer;
pub mod session;
pub mod surge;
pub mod trip_machine;
pub mod wait_billing;

// Re-export commonly used types
pub use session::TripSession;
pub use trip_machine::TripMachine;
