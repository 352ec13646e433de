// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/monitor-presence-rs

//! Presence module - per-device verdicts, household aggregates, locality

mod confidence;
mod household;
mod locality;

pub use confidence::{
    ConfidenceAggregator, DebounceAction, DeviceConfidenceState, LocationReading, Outcome,
    SignalUpdate,
};
pub use household::{HouseholdAggregator, HouseholdChanges, HouseholdState};
pub use locality::resolve_nearest;

use std::collections::HashMap;
use std::fmt;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable device identifier (normalized MAC or beacon name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceKey(String);

impl DeviceKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derive the key from the id segment of a monitor topic.
    ///
    /// Allow-listed beacons map to their configured name; everything else
    /// becomes the id with separators replaced by underscores.
    pub fn from_topic_id(id: &str, known_beacons: &HashMap<String, String>) -> Self {
        let lowered = id.trim().to_lowercase();
        if let Some(name) = known_beacons.get(&lowered) {
            return Self(name.replace(' ', "_"));
        }
        Self(lowered.replace([':', '-'], "_"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Device class reported by the scanners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceClass {
    KnownMac,
    GenericBeacon,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::KnownMac => "KNOWN_MAC",
            DeviceClass::GenericBeacon => "GENERIC_BEACON",
        }
    }
}

/// Committed home/away decision for a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Home,
    Away,
}

/// Identity of a tracked device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub key: DeviceKey,
    /// Raw id as the scanners report it (MAC or beacon UUID)
    pub id: Option<String>,
    pub name: Option<String>,
    pub class: DeviceClass,
}

impl Device {
    pub fn new(key: DeviceKey, class: DeviceClass) -> Self {
        Self { key, id: None, name: None, class }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Title-cased display name, falling back to the key.
    pub fn friendly_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => title_case(self.key.as_str()),
        }
    }
}

/// A confidence reading from one scanner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub device: Device,
    pub location: String,
    pub confidence: u8,
    pub signal_strength: Option<i32>,
    pub reported_at: DateTime<Utc>,
}

/// `"living_room"` -> `"Living Room"`
pub fn title_case(raw: &str) -> String {
    raw.split(['_', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// `"Living Room"` -> `"living_room"`
pub fn normalize_location(raw: &str) -> String {
    raw.trim().replace(' ', "_").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_ids_are_normalized() {
        let beacons = HashMap::new();
        assert_eq!(
            DeviceKey::from_topic_id("AA:BB:CC:DD:EE:FF", &beacons).as_str(),
            "aa_bb_cc_dd_ee_ff"
        );
        assert_eq!(
            DeviceKey::from_topic_id("e2c56db5-dffb-48d2", &beacons).as_str(),
            "e2c56db5_dffb_48d2"
        );
    }

    #[test]
    fn known_beacons_map_to_their_names() {
        let mut beacons = HashMap::new();
        beacons.insert("e2c56db5-dffb".to_string(), "car keys".to_string());
        assert_eq!(DeviceKey::from_topic_id("E2C56DB5-DFFB", &beacons).as_str(), "car_keys");
    }

    #[test]
    fn title_case_handles_underscores_and_spaces() {
        assert_eq!(title_case("living_room"), "Living Room");
        assert_eq!(title_case("  GARAGE door "), "Garage Door");
        assert_eq!(normalize_location("Living Room"), "living_room");
    }
}
