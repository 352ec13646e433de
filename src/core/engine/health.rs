// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/monitor-presence-rs

//! Scanner liveness, offline cleanup and the location sweep

use chrono::Local;
use serde_json::json;
use tracing::{debug, info, warn};

use super::{Engine, TimerKey, NEW_LOCATION_LOAD_DELAY};
use crate::config::OfflinePolicy;
use crate::entities::{attrs, Attributes};
use crate::hardware::next_occurrence;
use crate::health::{CleanupTimer, HealthUpdate, Liveness};
use crate::presence::{title_case, DeviceKey};

impl Engine {
    pub(super) fn on_status(&mut self, location: &str, liveness: Liveness) {
        let update = self.health.on_status(location, liveness);
        self.apply_health(location, update);
    }

    pub(super) fn on_echo(&mut self, location: &str, ok: bool) {
        if let Some(update) = self.health.on_echo(location, ok) {
            self.apply_health(location, update);
        }
    }

    fn apply_health(&mut self, location: &str, update: HealthUpdate) {
        let cleanup_key = TimerKey::LocationCleanup(location.to_string());
        match update.cleanup {
            CleanupTimer::Arm => {
                self.scheduler
                    .schedule(cleanup_key, self.presence.system_timeout());
            }
            CleanupTimer::Cancel => {
                self.scheduler.cancel(&cleanup_key);
            }
            CleanupTimer::Keep => {}
        }

        let node = self.names.node(location);
        if update.first_seen {
            info!(location, "New scanner location");
            self.store.set(
                &node,
                None,
                attrs([
                    ("friendly_name", json!(format!("{} State", title_case(location)))),
                    ("location", json!(title_case(location))),
                    ("last_rebooted", json!("")),
                    ("reboot_scheduled", json!("off")),
                ]),
            );
            self.scheduler
                .schedule(TimerKey::LoadKnownDevices, NEW_LOCATION_LOAD_DELAY);
        }

        let Some(liveness) = update.changed else {
            return;
        };
        self.store.set(&node, Some(liveness.as_str()), Default::default());
        self.update_monitor_entity();
        self.events.publish_scanner(location, liveness);

        if update.recovered {
            info!(location, "Scanner back online, reloading device states");
            self.reload_device_state();
        }

        match liveness {
            Liveness::Online => self.cancel_auto_reboot(location),
            Liveness::Offline if !update.first_seen => self.schedule_auto_reboot(location),
            Liveness::Offline => {}
        }
    }

    pub(super) fn on_cleanup_expired(&mut self, location: &str) {
        let was_online = self.health.liveness(location) == Some(Liveness::Online);
        if !self.health.cleanup_due(location) {
            return;
        }
        warn!(location, "Scanner silent for too long, clearing its readings");
        self.events
            .publish_alert("warning", &format!("{} scanner offline", title_case(location)));
        self.mark_node_offline(location, was_online);
        self.clear_readings(location);
    }

    /// Operator request to drop a location's contribution right away.
    pub(super) fn clear_location(&mut self, location: &str) {
        info!(location, "Clearing location");
        self.scheduler
            .cancel(&TimerKey::LocationCleanup(location.to_string()));
        let was_online = self.health.force_offline(location);
        self.mark_node_offline(location, was_online);
        self.clear_readings(location);
    }

    fn mark_node_offline(&mut self, location: &str, was_online: bool) {
        let node = self.names.node(location);
        if self.store.exists(&node) {
            self.store.set(&node, Some(Liveness::Offline.as_str()), Default::default());
        }
        self.update_monitor_entity();
        if was_online {
            self.events.publish_scanner(location, Liveness::Offline);
            self.schedule_auto_reboot(location);
        }
    }

    /// Remove the location's readings from every verdict, then let each
    /// affected device fall back to whatever the remaining scanners say.
    fn clear_readings(&mut self, location: &str) {
        let affected = self.confidence.clear_location(location);
        debug!(location, devices = affected.len(), "Cleared readings");

        for key in &affected {
            self.project_confidence(key, location);
            let outcome = self.confidence.evaluate(key);
            self.apply_outcome(key, outcome);
        }

        let end = self.scans.forget(location);
        self.after_scan_end(end);
        self.locations.remove(location);

        if self.presence.offline_policy == OfflinePolicy::ClearAndRescan {
            self.request_arrive_scan();
        }
    }

    /// Drop readings and confidence entities of locations that stopped
    /// delivering readings.
    pub(super) fn sweep_locations(&mut self) {
        let keep: Vec<String> = self.locations.iter().cloned().collect();
        let stale: Vec<(DeviceKey, String)> = self
            .confidence
            .devices()
            .flat_map(|state| {
                state
                    .readings()
                    .iter()
                    .filter(|r| !keep.contains(&r.location))
                    .map(|r| (state.device.key.clone(), r.location.clone()))
                    .collect::<Vec<_>>()
            })
            .collect();
        if stale.is_empty() {
            return;
        }

        info!(readings = stale.len(), "Sweeping stale locations");
        for (key, location) in &stale {
            self.store.remove(&self.names.confidence(key, location));
        }
        for key in self.confidence.retain_locations(&keep) {
            let outcome = self.confidence.evaluate(&key);
            self.apply_outcome(&key, outcome);
        }
    }

    fn schedule_auto_reboot(&mut self, location: &str) {
        if !self.hardware.auto_reboot_when_offline(location) {
            return;
        }
        let key = TimerKey::NodeReboot(location.to_string());
        if self.scheduler.is_pending(&key) {
            return;
        }
        let now = Local::now();
        let wait = match self.hardware.reboot_time(location) {
            Some(at) => next_occurrence(now.naive_local(), at) - now.naive_local(),
            None => chrono::Duration::seconds(self.presence.system_timeout_secs as i64),
        };
        let delay = wait.to_std().unwrap_or_default();
        info!(location, "Scanner offline, reboot scheduled in {:?}", delay);
        self.scheduler.schedule(key, delay);
        self.set_node_attributes(
            location,
            attrs([
                ("reboot_scheduled", json!("on")),
                ("reboot_time", json!((now + wait).to_rfc3339())),
            ]),
        );
    }

    fn cancel_auto_reboot(&mut self, location: &str) {
        if self
            .scheduler
            .cancel(&TimerKey::NodeReboot(location.to_string()))
        {
            info!(location, "Scanner back online, scheduled reboot canceled");
            self.set_node_attributes(location, attrs([("reboot_scheduled", json!("off"))]));
        }
    }

    /// Node entities are created on first status; a node the engine has
    /// never heard from has no entity to annotate.
    pub(super) fn set_node_attributes(&self, location: &str, attributes: Attributes) {
        let node = self.names.node(location);
        if self.store.exists(&node) {
            self.store.set(&node, None, attributes);
        } else {
            debug!(location, "No node entity yet, skipping attribute update");
        }
    }
}
