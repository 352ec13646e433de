// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/monitor-presence-rs

//! Scanning module - fleet-wide scan state and scan request policy

mod coordinator;

pub use coordinator::{ArriveDecision, DepartDecision, ScanCoordinator, ScanEnd};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;

/// Scan requests the engine can send to the monitors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanKind {
    Arrive,
    Depart,
    Rssi,
}

impl ScanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanKind::Arrive => "arrive",
            ScanKind::Depart => "depart",
            ScanKind::Rssi => "rssi",
        }
    }
}

impl fmt::Display for ScanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "arrive" | "arrival" => Ok(ScanKind::Arrive),
            "depart" | "departure" => Ok(ScanKind::Depart),
            "rssi" => Ok(ScanKind::Rssi),
            other => Err(ProtocolError::UnknownScan(other.to_string())),
        }
    }
}

/// Global scanner fleet state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ScanPhase {
    Idle,
    Scanning {
        scan_type: String,
        locations: Vec<String>,
    },
}

impl ScanPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanPhase::Idle => "idle",
            ScanPhase::Scanning { .. } => "scanning",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, ScanPhase::Idle)
    }
}
