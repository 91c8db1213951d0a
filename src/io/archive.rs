//! Trip archive - writes finished trips to file
//!
//! Trips are written in JSONL format (one JSON object per line)
//! to the file specified in config.

use crate::domain::trip::Trip;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, error, info};

/// Append-only archive of finished trips
pub struct TripArchive {
    file_path: String,
}

impl TripArchive {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "archive_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Write a finished trip to the archive file
    /// Returns true if successful, false otherwise
    pub fn record(&self, trip: &Trip) -> bool {
        let json = match serde_json::to_string(trip) {
            Ok(json) => json,
            Err(e) => {
                error!(trip_id = %trip.id, error = %e, "trip_serialize_failed");
                return false;
            }
        };

        match self.append_line(&json) {
            Ok(()) => {
                info!(
                    trip_id = %trip.id,
                    status = %trip.status.as_str(),
                    moments = %trip.moments.len(),
                    "trip_archived"
                );
                true
            }
            Err(e) => {
                error!(
                    trip_id = %trip.id,
                    error = %e,
                    "trip_archive_failed"
                );
                false
            }
        }
    }

    /// Append a line to the archive file
    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "archive_written");

        Ok(())
    }
}
