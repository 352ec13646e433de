// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/monitor-presence-rs

//! Confidence aggregation
//!
//! Combines the latest confidence from every scanner into one home/away
//! verdict per device. Home is committed as soon as any live reading
//! reaches the threshold. Away is only committed by [`ConfidenceAggregator::debounce_expired`],
//! which the owner calls when the debounce timer requested through
//! [`DebounceAction::Start`] runs out, and which re-checks the readings
//! at that moment.

use std::collections::BTreeMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Device, DeviceKey, Reading, Verdict};

/// Latest reading from one scanner for one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationReading {
    pub location: String,
    /// `None` once the location has been cleared (scanner went offline)
    pub confidence: Option<u8>,
    pub signal_strength: Option<i32>,
    pub reported_at: DateTime<Utc>,
}

impl LocationReading {
    pub fn is_cleared(&self) -> bool {
        self.confidence.is_none()
    }
}

/// Per-device aggregation state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfidenceState {
    pub device: Device,
    /// In first-seen order
    readings: Vec<LocationReading>,
    verdict: Option<Verdict>,
    debounce_pending: bool,
}

impl DeviceConfidenceState {
    fn new(device: Device) -> Self {
        Self {
            device,
            readings: Vec::new(),
            verdict: None,
            debounce_pending: false,
        }
    }

    pub fn verdict(&self) -> Option<Verdict> {
        self.verdict
    }

    pub fn readings(&self) -> &[LocationReading] {
        &self.readings
    }

    pub fn reading(&self, location: &str) -> Option<&LocationReading> {
        self.readings.iter().find(|r| r.location == location)
    }

    pub fn debounce_pending(&self) -> bool {
        self.debounce_pending
    }

    /// Any live reading at or above the threshold
    fn qualifies(&self, minimum_confidence: u8) -> bool {
        self.readings
            .iter()
            .filter_map(|r| r.confidence)
            .any(|c| c >= minimum_confidence)
    }

    fn reading_mut(&mut self, location: &str) -> Option<&mut LocationReading> {
        self.readings.iter_mut().find(|r| r.location == location)
    }
}

/// What the owner must do with the device's debounce timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceAction {
    Keep,
    /// Request a re-check scan and start the away timer
    Start,
    Cancel,
}

/// Result of feeding a reading or re-evaluating a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// Newly committed verdict, if it changed
    pub transition: Option<Verdict>,
    pub debounce: DebounceAction,
    /// Device was seen for the first time
    pub created: bool,
}

impl Outcome {
    fn unchanged() -> Self {
        Self {
            transition: None,
            debounce: DebounceAction::Keep,
            created: false,
        }
    }
}

/// Result of recording a signal-strength sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalUpdate {
    Accepted,
    /// No readings at all for the device
    UnknownDevice,
    /// Device is not home or has no live reading from that location
    Ignored,
}

pub struct ConfidenceAggregator {
    minimum_confidence: u8,
    devices: BTreeMap<DeviceKey, DeviceConfidenceState>,
}

impl ConfidenceAggregator {
    pub fn new(minimum_confidence: u8) -> Self {
        Self {
            minimum_confidence,
            devices: BTreeMap::new(),
        }
    }

    pub fn minimum_confidence(&self) -> u8 {
        self.minimum_confidence
    }

    /// Track a device before it has reported; its verdict stays unknown.
    pub fn register(&mut self, device: Device) -> bool {
        if self.devices.contains_key(&device.key) {
            return false;
        }
        self.devices
            .insert(device.key.clone(), DeviceConfidenceState::new(device));
        true
    }

    pub fn report(&mut self, reading: Reading) -> Outcome {
        let key = reading.device.key.clone();
        let created = !self.devices.contains_key(&key);
        let minimum = self.minimum_confidence;

        let state = self
            .devices
            .entry(key)
            .or_insert_with(|| DeviceConfidenceState::new(reading.device.clone()));

        if reading.device.name.is_some() {
            state.device.name = reading.device.name.clone();
        }
        if reading.device.id.is_some() {
            state.device.id = reading.device.id.clone();
        }
        state.device.class = reading.device.class;

        // A zero confidence means the device vanished from that scanner,
        // so whatever signal strength it last had is meaningless.
        let signal = if reading.confidence == 0 {
            None
        } else {
            reading.signal_strength
        };

        match state.reading_mut(&reading.location) {
            Some(existing) => {
                existing.confidence = Some(reading.confidence);
                existing.reported_at = reading.reported_at;
                if reading.confidence == 0 || signal.is_some() {
                    existing.signal_strength = signal;
                }
            }
            None => state.readings.push(LocationReading {
                location: reading.location,
                confidence: Some(reading.confidence),
                signal_strength: signal,
                reported_at: reading.reported_at,
            }),
        }

        let mut outcome = Self::evaluate_state(state, minimum);
        outcome.created = created;
        outcome
    }

    /// Re-run the verdict rules after readings changed without a report.
    pub fn evaluate(&mut self, key: &DeviceKey) -> Outcome {
        let minimum = self.minimum_confidence;
        match self.devices.get_mut(key) {
            Some(state) => Self::evaluate_state(state, minimum),
            None => Outcome::unchanged(),
        }
    }

    fn evaluate_state(state: &mut DeviceConfidenceState, minimum: u8) -> Outcome {
        let qualifies = state.qualifies(minimum);

        // First verdict is taken straight from the readings; there is no
        // earlier home state to debounce against.
        if state.verdict.is_none() {
            if state.readings.iter().all(LocationReading::is_cleared) {
                return Outcome::unchanged();
            }
            let verdict = if qualifies { Verdict::Home } else { Verdict::Away };
            state.verdict = Some(verdict);
            return Outcome {
                transition: Some(verdict),
                debounce: DebounceAction::Keep,
                created: false,
            };
        }

        if qualifies {
            let debounce = if state.debounce_pending {
                state.debounce_pending = false;
                DebounceAction::Cancel
            } else {
                DebounceAction::Keep
            };
            let transition = if state.verdict != Some(Verdict::Home) {
                state.verdict = Some(Verdict::Home);
                Some(Verdict::Home)
            } else {
                None
            };
            return Outcome {
                transition,
                debounce,
                created: false,
            };
        }

        if state.verdict == Some(Verdict::Home) && !state.debounce_pending {
            state.debounce_pending = true;
            return Outcome {
                transition: None,
                debounce: DebounceAction::Start,
                created: false,
            };
        }

        Outcome::unchanged()
    }

    /// The away timer ran out. Commits away only if no live reading
    /// qualifies right now.
    pub fn debounce_expired(&mut self, key: &DeviceKey) -> Option<Verdict> {
        let minimum = self.minimum_confidence;
        let state = self.devices.get_mut(key)?;
        state.debounce_pending = false;

        if state.qualifies(minimum) || state.verdict != Some(Verdict::Home) {
            return None;
        }

        state.verdict = Some(Verdict::Away);
        for reading in &mut state.readings {
            reading.signal_strength = None;
        }
        Some(Verdict::Away)
    }

    /// Mark every reading attributed to `location` as cleared.
    ///
    /// Returns the devices that lost a live reading. Verdicts are left
    /// alone; call [`Self::evaluate`] on each to start their debounce.
    pub fn clear_location(&mut self, location: &str) -> Vec<DeviceKey> {
        let mut affected = Vec::new();
        for (key, state) in self.devices.iter_mut() {
            if let Some(reading) = state.reading_mut(location) {
                if !reading.is_cleared() {
                    affected.push(key.clone());
                }
                reading.confidence = None;
                reading.signal_strength = None;
            }
        }
        affected
    }

    pub fn record_signal(&mut self, key: &DeviceKey, location: &str, strength: i32) -> SignalUpdate {
        let state = match self.devices.get_mut(key) {
            Some(state) if !state.readings.is_empty() => state,
            _ => return SignalUpdate::UnknownDevice,
        };
        if state.verdict != Some(Verdict::Home) {
            return SignalUpdate::Ignored;
        }
        match state.reading_mut(location) {
            Some(reading) if !reading.is_cleared() => {
                reading.signal_strength = Some(strength);
                SignalUpdate::Accepted
            }
            _ => SignalUpdate::Ignored,
        }
    }

    pub fn remove(&mut self, key: &DeviceKey) -> Option<DeviceConfidenceState> {
        self.devices.remove(key)
    }

    /// Find a device by the raw id the scanners use for it.
    pub fn find_by_id(&self, id: &str) -> Option<DeviceKey> {
        let wanted = id.trim().to_lowercase();
        self.devices
            .values()
            .find(|s| {
                s.device
                    .id
                    .as_deref()
                    .map(|i| i.to_lowercase() == wanted)
                    .unwrap_or(false)
            })
            .map(|s| s.device.key.clone())
    }

    pub fn get(&self, key: &DeviceKey) -> Option<&DeviceConfidenceState> {
        self.devices.get(key)
    }

    pub fn contains(&self, key: &DeviceKey) -> bool {
        self.devices.contains_key(key)
    }

    pub fn devices(&self) -> impl Iterator<Item = &DeviceConfidenceState> {
        self.devices.values()
    }

    pub fn verdicts(&self) -> impl Iterator<Item = Option<Verdict>> + '_ {
        self.devices.values().map(|s| s.verdict)
    }

    /// Locations that still hold a live reading for some device.
    pub fn active_locations(&self) -> Vec<String> {
        let mut locations: Vec<String> = self
            .devices
            .values()
            .flat_map(|s| s.readings.iter())
            .filter(|r| !r.is_cleared())
            .map(|r| r.location.clone())
            .collect();
        locations.sort();
        locations.dedup();
        locations
    }

    /// Forget readings from locations not in `keep`.
    pub fn retain_locations(&mut self, keep: &[String]) -> Vec<DeviceKey> {
        let mut affected = Vec::new();
        for (key, state) in self.devices.iter_mut() {
            let before = state.readings.len();
            state.readings.retain(|r| keep.contains(&r.location));
            if state.readings.len() != before {
                affected.push(key.clone());
            }
        }
        affected
    }
}
