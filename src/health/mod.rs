// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/monitor-presence-rs

//! Location health module - scanner liveness from status and echo traffic
//!
//! The monitor owns no timers. Each transition tells the caller whether
//! the location's cleanup timer must be armed, canceled or left alone;
//! when that timer fires, [`HealthMonitor::cleanup_due`] re-validates
//! that nothing proved the scanner alive in the meantime.

use std::collections::BTreeMap;
use std::fmt;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::ProtocolError;
use crate::presence::title_case;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    Online,
    Offline,
}

impl Liveness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Liveness::Online => "online",
            Liveness::Offline => "offline",
        }
    }

    pub fn parse(payload: &str) -> Result<Self, ProtocolError> {
        match payload.trim().to_lowercase().as_str() {
            "online" => Ok(Liveness::Online),
            "offline" => Ok(Liveness::Offline),
            other => Err(ProtocolError::UnknownStatus(other.to_string())),
        }
    }
}

impl fmt::Display for Liveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-location liveness record
#[derive(Debug, Clone)]
struct ScannerStatus {
    liveness: Liveness,
    /// Last time the scanner proved itself alive
    last_alive: Option<Instant>,
    /// When the pending cleanup timer was armed
    cleanup_armed_at: Option<Instant>,
}

impl ScannerStatus {
    fn new(liveness: Liveness) -> Self {
        Self {
            liveness,
            last_alive: None,
            cleanup_armed_at: None,
        }
    }

    pub fn cleanup_pending(&self) -> bool {
        self.cleanup_armed_at.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupTimer {
    Keep,
    /// (Re)start the cleanup timer, superseding any earlier one
    Arm,
    Cancel,
}

/// Consequences of a status or echo message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthUpdate {
    pub cleanup: CleanupTimer,
    /// Location had never been heard from before
    pub first_seen: bool,
    /// Liveness changed; carries the new value
    pub changed: Option<Liveness>,
    /// Location came back from offline; device states need reloading
    pub recovered: bool,
}

#[derive(Debug, Default)]
pub struct HealthMonitor {
    scanners: BTreeMap<String, ScannerStatus>,
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_status(&mut self, location: &str, liveness: Liveness) -> HealthUpdate {
        let now = Instant::now();
        let first_seen = !self.scanners.contains_key(location);
        let status = self
            .scanners
            .entry(location.to_string())
            .or_insert_with(|| ScannerStatus::new(liveness));
        let previous = if first_seen { None } else { Some(status.liveness) };

        let cleanup = match liveness {
            Liveness::Offline => {
                status.cleanup_armed_at = Some(now);
                CleanupTimer::Arm
            }
            Liveness::Online => {
                status.last_alive = Some(now);
                status.cleanup_armed_at = None;
                CleanupTimer::Cancel
            }
        };
        status.liveness = liveness;

        let changed = if previous != Some(liveness) { Some(liveness) } else { None };
        if changed.is_some() {
            info!(location, status = %liveness, "Scanner status changed");
        }

        HealthUpdate {
            cleanup,
            first_seen,
            changed,
            recovered: previous == Some(Liveness::Offline) && liveness == Liveness::Online,
        }
    }

    /// `ok` echo replies prove liveness and re-arm the watchdog; anything
    /// else is ignored.
    pub fn on_echo(&mut self, location: &str, ok: bool) -> Option<HealthUpdate> {
        if !ok {
            debug!(location, "Ignoring echo reply that is not ok");
            return None;
        }
        let now = Instant::now();
        let first_seen = !self.scanners.contains_key(location);
        let status = self
            .scanners
            .entry(location.to_string())
            .or_insert_with(|| ScannerStatus::new(Liveness::Online));
        let previous = if first_seen { None } else { Some(status.liveness) };

        status.last_alive = Some(now);
        status.cleanup_armed_at = Some(now);
        status.liveness = Liveness::Online;

        let changed = if previous != Some(Liveness::Online) {
            info!(location, "Scanner answered echo, now online");
            Some(Liveness::Online)
        } else {
            None
        };

        Some(HealthUpdate {
            cleanup: CleanupTimer::Arm,
            first_seen,
            changed,
            recovered: previous == Some(Liveness::Offline),
        })
    }

    /// Re-validate a fired cleanup timer. True when the location must be
    /// cleaned; the location is then marked offline.
    pub fn cleanup_due(&mut self, location: &str) -> bool {
        let Some(status) = self.scanners.get_mut(location) else {
            return false;
        };
        let Some(armed_at) = status.cleanup_armed_at.take() else {
            return false;
        };
        if let Some(alive) = status.last_alive {
            if alive > armed_at {
                debug!(location, "Scanner heard from after cleanup was armed");
                return false;
            }
        }
        status.liveness = Liveness::Offline;
        true
    }

    /// Mark a location offline without waiting for its timer. Returns
    /// whether it was known and not already offline.
    pub fn force_offline(&mut self, location: &str) -> bool {
        match self.scanners.get_mut(location) {
            Some(status) => {
                status.cleanup_armed_at = None;
                let was_online = status.liveness == Liveness::Online;
                status.liveness = Liveness::Offline;
                was_online
            }
            None => false,
        }
    }

    pub fn liveness(&self, location: &str) -> Option<Liveness> {
        self.scanners.get(location).map(|s| s.liveness)
    }

    /// Display names of nodes currently online
    pub fn online_nodes(&self) -> Vec<String> {
        self.nodes_with(Liveness::Online)
    }

    pub fn offline_nodes(&self) -> Vec<String> {
        self.nodes_with(Liveness::Offline)
    }

    pub fn node_count(&self) -> usize {
        self.scanners.len()
    }

    fn nodes_with(&self, liveness: Liveness) -> Vec<String> {
        self.scanners
            .iter()
            .filter(|(_, s)| s.liveness == liveness)
            .map(|(location, _)| title_case(location))
            .collect()
    }
}
