// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/monitor-presence-rs

use crate::config::{DeviceDomain, PresenceConfig};
use crate::presence::DeviceKey;

/// Entity naming scheme
#[derive(Debug, Clone)]
pub struct EntityNames {
    root: String,
    domain: DeviceDomain,
    everyone_home: String,
    everyone_not_home: String,
    somebody_is_home: String,
}

impl EntityNames {
    pub fn from_config(presence: &PresenceConfig) -> Self {
        Self {
            root: presence.root_name().to_string(),
            domain: presence.user_device_domain,
            everyone_home: presence.everyone_home.clone(),
            everyone_not_home: presence.everyone_not_home.clone(),
            somebody_is_home: presence.somebody_is_home.clone(),
        }
    }

    pub fn domain(&self) -> DeviceDomain {
        self.domain
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// `binary_sensor.monitor_aa_bb_cc`
    pub fn device(&self, device: &DeviceKey) -> String {
        format!("{}.{}_{}", self.domain.as_str(), self.root, device)
    }

    /// `sensor.monitor_aa_bb_cc_kitchen_conf`
    pub fn confidence(&self, device: &DeviceKey, location: &str) -> String {
        format!("sensor.{}_{}_{}_conf", self.root, device, location)
    }

    pub fn monitor(&self) -> String {
        format!("{}.monitor_state", self.root)
    }

    pub fn node(&self, location: &str) -> String {
        format!("{}.{}_state", self.root, location)
    }

    /// Prefix of the engine's own system entities
    pub fn system_prefix(&self) -> String {
        format!("{}.", self.root)
    }

    pub fn everyone_home(&self) -> String {
        format!("binary_sensor.{}", self.everyone_home)
    }

    pub fn everyone_not_home(&self) -> String {
        format!("binary_sensor.{}", self.everyone_not_home)
    }

    pub fn somebody_is_home(&self) -> String {
        format!("binary_sensor.{}", self.somebody_is_home)
    }
}
