//! Active trip snapshot - survives process restarts
//!
//! The snapshot holds at most one trip. It is rewritten on every status
//! change and removed when the trip reaches a terminal state, so a crash
//! mid-trip rehydrates into the same leg after restart.

use crate::domain::trip::Trip;
use std::fs;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Single-slot persistence for the active trip
pub struct SnapshotStore {
    file_path: String,
}

impl SnapshotStore {
    pub fn new(file_path: &str) -> Self {
        Self { file_path: file_path.to_string() }
    }

    /// Persist the active trip, replacing any previous snapshot
    /// Returns true if successful, false otherwise
    pub fn save(&self, trip: &Trip) -> bool {
        let json = match serde_json::to_string_pretty(trip) {
            Ok(json) => json,
            Err(e) => {
                error!(trip_id = %trip.id, error = %e, "snapshot_serialize_failed");
                return false;
            }
        };

        match self.write_file(&json) {
            Ok(()) => {
                debug!(trip_id = %trip.id, status = %trip.status.as_str(), "snapshot_saved");
                true
            }
            Err(e) => {
                error!(trip_id = %trip.id, error = %e, "snapshot_save_failed");
                false
            }
        }
    }

    /// Load a previously saved trip, if one exists.
    /// A corrupt snapshot is discarded rather than blocking startup.
    pub fn load(&self) -> Option<Trip> {
        let path = Path::new(&self.file_path);
        if !path.exists() {
            return None;
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!(file = %self.file_path, error = %e, "snapshot_read_failed");
                return None;
            }
        };

        match serde_json::from_str::<Trip>(&content) {
            Ok(trip) => {
                info!(trip_id = %trip.id, status = %trip.status.as_str(), "snapshot_loaded");
                Some(trip)
            }
            Err(e) => {
                warn!(file = %self.file_path, error = %e, "snapshot_corrupt");
                self.clear();
                None
            }
        }
    }

    /// Remove the snapshot file. Missing files are fine.
    pub fn clear(&self) {
        let path = Path::new(&self.file_path);
        if !path.exists() {
            return;
        }
        match fs::remove_file(path) {
            Ok(()) => debug!(file = %self.file_path, "snapshot_cleared"),
            Err(e) => warn!(file = %self.file_path, error = %e, "snapshot_clear_failed"),
        }
    }

    fn write_file(&self, content: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::offer::RideOffer;
    use crate::domain::trip::TripStatus;
    use crate::domain::types::{Location, OfferId, RiderSummary};
    use std::fs;
    use tempfile::tempdir;

    fn test_trip() -> Trip {
        let offer = RideOffer {
            id: OfferId("of-1".to_string()),
            rider: RiderSummary { name: "Ana".into(), rating: 4.9, phone: None, photo_url: None },
            pickup: Location::new("100 Main St", 36.373, -94.209),
            destination: Location::new("200 Elm St", 36.385, -94.220),
            estimated_fare: 12.5,
            estimated_distance_miles: 3.2,
            estimated_duration_minutes: 11.0,
            surge_multiplier: 1.0,
            expires_at_ms: 15_000,
        };
        Trip::from_offer(offer, 1_000)
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("active_trip.json");
        let store = SnapshotStore::new(file_path.to_str().unwrap());

        let mut trip = test_trip();
        trip.transition(TripStatus::AtPickup, 60_000).unwrap();

        assert!(store.save(&trip));

        let loaded = store.load().expect("snapshot should load");
        assert_eq!(loaded.id, trip.id);
        assert_eq!(loaded.status, TripStatus::AtPickup);
        assert_eq!(loaded.arrived_at_ms, Some(60_000));
        assert_eq!(loaded.moments.len(), trip.moments.len());
    }

    #[test]
    fn test_load_missing_returns_none() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("active_trip.json");
        let store = SnapshotStore::new(file_path.to_str().unwrap());

        assert!(store.load().is_none());
    }

    #[test]
    fn test_load_corrupt_discards_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("active_trip.json");
        fs::write(&file_path, "{not json").unwrap();

        let store = SnapshotStore::new(file_path.to_str().unwrap());
        assert!(store.load().is_none());
        // Corrupt file is removed so it cannot wedge every startup
        assert!(!file_path.exists());
    }

    #[test]
    fn test_save_replaces_previous() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("active_trip.json");
        let store = SnapshotStore::new(file_path.to_str().unwrap());

        let mut trip = test_trip();
        store.save(&trip);
        trip.transition(TripStatus::AtPickup, 60_000).unwrap();
        store.save(&trip);

        let loaded = store.load().unwrap();
        assert_eq!(loaded.status, TripStatus::AtPickup);
    }

    #[test]
    fn test_clear_removes_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("active_trip.json");
        let store = SnapshotStore::new(file_path.to_str().unwrap());

        store.save(&test_trip());
        assert!(file_path.exists());

        store.clear();
        assert!(!file_path.exists());
        assert!(store.load().is_none());

        // Clearing again is a no-op
        store.clear();
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("state").join("active_trip.json");
        let store = SnapshotStore::new(nested.to_str().unwrap());

        assert!(store.save(&test_trip()));
        assert!(nested.exists());
    }
}
