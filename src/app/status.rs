//! Read-only status snapshot for external monitoring.
//!
//! The engine writes a JSON snapshot on every housekeeping cycle and once
//! more on shutdown. `plutus status` reads it back.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::counters::Counters;
use crate::domain::{Position, PositionStatus, VenueId};
use crate::error::Result;
use crate::ingest::VenueStatus;
use crate::ledger::LedgerSnapshot;

/// Current status file format version.
pub const STATUS_VERSION: &str = "1";

/// Health of one venue as reported in the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueReport {
    pub venue: VenueId,
    pub status: VenueStatus,
}

/// Everything an operator can see about a running engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Schema version for forward compatibility.
    pub version: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub pid: u32,
    pub dry_run: bool,
    pub strategies: Vec<String>,
    pub ledger: LedgerSnapshot,
    pub venues: Vec<VenueReport>,
    /// Live position count keyed by status name.
    pub positions_by_status: BTreeMap<String, usize>,
    pub positions: Vec<Position>,
    pub counters: Counters,
    /// Reason the kill switch was tripped, if it was.
    pub kill_switch: Option<String>,
    /// True once trading stopped for good: ledger halt or kill switch.
    pub halted: bool,
}

impl StatusSnapshot {
    /// Group live positions by status name.
    #[must_use]
    pub fn count_by_status<'a>(
        positions: impl IntoIterator<Item = &'a Position>,
    ) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for position in positions {
            *counts
                .entry(position.status().as_str().to_string())
                .or_insert(0) += 1;
        }
        counts
    }

    #[must_use]
    pub fn positions_in(&self, status: PositionStatus) -> usize {
        self.positions_by_status
            .get(status.as_str())
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn degraded_venues(&self) -> Vec<&VenueId> {
        self.venues
            .iter()
            .filter(|v| !v.status.is_healthy())
            .map(|v| &v.venue)
            .collect()
    }
}

/// Writes snapshots atomically: temp file, fsync, rename.
#[derive(Debug, Clone)]
pub struct StatusWriter {
    path: PathBuf,
}

impl StatusWriter {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `snapshot` over the status file.
    ///
    /// Creates the parent directory if it doesn't exist.
    ///
    /// # Errors
    /// Returns an error if serialization or any file operation fails. The
    /// previous file is left intact on failure.
    pub fn write(&self, snapshot: &StatusSnapshot) -> Result<()> {
        let json = serde_json::to_string_pretty(snapshot)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp_path = self.path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)?;
        let cleanup_and_err = |e| {
            let _ = fs::remove_file(&temp_path);
            e
        };
        file.write_all(json.as_bytes()).map_err(cleanup_and_err)?;
        file.sync_all().map_err(cleanup_and_err)?;
        fs::rename(&temp_path, &self.path).map_err(cleanup_and_err)?;
        Ok(())
    }

    /// Read a snapshot back from `path`.
    ///
    /// # Errors
    /// Returns an error if the file is missing or not a valid snapshot.
    pub fn read(path: impl AsRef<Path>) -> Result<StatusSnapshot> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
