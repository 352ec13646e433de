// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/monitor-presence-rs

//! Device verdicts, household aggregates and their entities

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{Engine, TimerKey};
use crate::entities::attrs;
use crate::presence::{
    resolve_nearest, title_case, DebounceAction, DeviceKey, Outcome, Reading, SignalUpdate, Verdict,
};

const UNKNOWN: &str = "unknown";

impl Engine {
    pub(super) fn on_reading(&mut self, reading: Reading) {
        let key = reading.device.key.clone();
        let location = reading.location.clone();
        let has_signal = reading.signal_strength.is_some();
        self.locations.insert(location.clone());

        let outcome = self.confidence.report(reading);
        if outcome.created {
            info!(device = %key, location = %location, "Tracking new device");
        }
        self.project_confidence(&key, &location);
        self.apply_outcome(&key, outcome);
        if has_signal {
            self.update_nearest(&key);
        }
    }

    pub(super) fn on_signal(&mut self, device: DeviceKey, location: &str, strength: i32) {
        match self.confidence.record_signal(&device, location, strength) {
            SignalUpdate::Accepted => {
                self.store.set(
                    &self.names.confidence(&device, location),
                    None,
                    attrs([("rssi", json!(strength))]),
                );
                self.update_nearest(&device);
            }
            SignalUpdate::UnknownDevice if self.confidence.contains(&device) => {
                warn!(device = %device, "Signal strength for a device without readings, requesting arrive scan");
                self.request_arrive_scan();
            }
            SignalUpdate::UnknownDevice => debug!(device = %device, "Signal strength for untracked device"),
            SignalUpdate::Ignored => debug!(device = %device, location, "Signal strength ignored"),
        }
    }

    /// Act on what the aggregator decided for one device.
    pub(super) fn apply_outcome(&mut self, key: &DeviceKey, outcome: Outcome) {
        match outcome.debounce {
            DebounceAction::Start => {
                debug!(device = %key, "No location confident, starting away timer");
                self.request_arrive_scan();
                self.scheduler
                    .schedule(TimerKey::Debounce(key.clone()), self.presence.not_home_timeout());
            }
            DebounceAction::Cancel => {
                debug!(device = %key, "Device confident again, away timer canceled");
                self.scheduler.cancel(&TimerKey::Debounce(key.clone()));
            }
            DebounceAction::Keep => {}
        }
        if let Some(verdict) = outcome.transition {
            self.commit_verdict(key, verdict);
        }
    }

    pub(super) fn on_debounce_expired(&mut self, key: &DeviceKey) {
        match self.confidence.debounce_expired(key) {
            Some(verdict) => self.commit_verdict(key, verdict),
            None => debug!(device = %key, "Away timer expired but device is still present"),
        }
    }

    fn commit_verdict(&mut self, key: &DeviceKey, verdict: Verdict) {
        let Some(state) = self.confidence.get(key) else {
            return;
        };
        let device = state.device.clone();
        let locations: Vec<String> = state.readings().iter().map(|r| r.location.clone()).collect();
        let domain = self.names.domain();
        let entity = self.names.device(key);

        let state_str = match verdict {
            Verdict::Home => domain.home_state(),
            Verdict::Away => domain.away_state(),
        };
        let mut attributes = attrs([
            ("friendly_name", json!(format!("{} Home", device.friendly_name()))),
            ("type", json!(device.class.as_str())),
            ("device_class", json!("presence")),
        ]);
        if let Some(id) = &device.id {
            attributes.insert("id".into(), json!(id));
        }
        self.store.set(&entity, Some(state_str), attributes);
        info!(device = %key, verdict = ?verdict, "Device is now {}", state_str);
        self.events.publish_verdict(key, verdict);

        match verdict {
            Verdict::Home => self.request_rssi_scan(),
            Verdict::Away => {
                for location in &locations {
                    let entity = self.names.confidence(key, location);
                    if self.store.exists(&entity) {
                        self.store.set(&entity, None, attrs([("rssi", json!(UNKNOWN))]));
                    }
                }
                self.store
                    .set(&entity, None, attrs([("nearest_monitor", json!(UNKNOWN))]));
            }
        }

        self.recompute_household();
    }

    pub(super) fn recompute_household(&mut self) {
        let (state, changes) = self.household.recompute(self.confidence.verdicts());
        if changes.is_empty() {
            return;
        }

        if let Some((home, count)) = changes.somebody_home {
            self.store.set(
                &self.names.somebody_is_home(),
                Some(on_off(home)),
                attrs([("count", json!(count))]),
            );
        }
        if let Some(everyone) = changes.everyone_home {
            self.store
                .set(&self.names.everyone_home(), Some(on_off(everyone)), Default::default());
        }
        if let Some(nobody) = changes.everyone_not_home {
            self.store
                .set(&self.names.everyone_not_home(), Some(on_off(nobody)), Default::default());
        }

        info!(
            home = state.home_count,
            everyone_home = state.everyone_home,
            everyone_not_home = state.everyone_not_home,
            "Household state changed"
        );
        self.events.publish_household(state);
    }

    /// Refresh the device entity's nearest scanner from current signals.
    fn update_nearest(&mut self, key: &DeviceKey) {
        let Some(state) = self.confidence.get(key) else {
            return;
        };
        if state.verdict() != Some(Verdict::Home) {
            return;
        }
        let nearest = resolve_nearest(state.readings())
            .map(|loc| title_case(&loc))
            .unwrap_or_else(|| UNKNOWN.to_string());
        self.store.set(
            &self.names.device(key),
            None,
            attrs([("nearest_monitor", json!(nearest))]),
        );
    }

    /// Mirror one device/location reading into its confidence entity.
    pub(super) fn project_confidence(&self, key: &DeviceKey, location: &str) {
        let Some(state) = self.confidence.get(key) else {
            return;
        };
        let Some(reading) = state.reading(location) else {
            return;
        };
        let device = &state.device;

        let value = match reading.confidence {
            Some(confidence) => confidence.to_string(),
            None => UNKNOWN.to_string(),
        };
        let rssi = reading
            .signal_strength
            .map(|s| json!(s))
            .unwrap_or_else(|| json!(UNKNOWN));

        let mut attributes = attrs([
            (
                "friendly_name",
                json!(format!("{} {}", device.friendly_name(), title_case(location))),
            ),
            ("type", json!(device.class.as_str())),
            ("location", json!(title_case(location))),
            ("unit_of_measurement", json!("%")),
            ("rssi", rssi),
            ("last_reported", json!(reading.reported_at.to_rfc3339())),
        ]);
        if let Some(id) = &device.id {
            attributes.insert("id".into(), json!(id));
        }
        if let Some(name) = &device.name {
            attributes.insert("name".into(), Value::String(name.clone()));
        }
        self.store
            .set(&self.names.confidence(key, location), Some(&value), attributes);
    }

    /// Forget a known device: tell the scanners, drop its state and entities.
    pub(super) fn remove_known_device(&mut self, device: &str) {
        let key = self
            .confidence
            .find_by_id(device)
            .unwrap_or_else(|| DeviceKey::from_topic_id(device, self.router.known_beacons()));

        info!(device = %device, "Removing known device");
        self.publish(&self.topics.delete_static_device(), device);
        self.known_devices
            .retain(|entry| !entry.split_whitespace().next().is_some_and(|id| id.eq_ignore_ascii_case(device)));

        self.scheduler.cancel(&TimerKey::Debounce(key.clone()));
        let removed = self.confidence.remove(&key);

        if let Some(state) = &removed {
            for reading in state.readings() {
                self.store.remove(&self.names.confidence(&key, &reading.location));
            }
        }
        self.store.remove(&self.names.device(&key));
        if removed.is_some() {
            self.recompute_household();
        }
    }
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}
