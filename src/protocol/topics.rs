// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/monitor-presence-rs

use crate::scanning::ScanKind;

/// Outbound topic construction under the monitor root
#[derive(Debug, Clone)]
pub struct Topics {
    root: String,
}

impl Topics {
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into().trim_end_matches('/').to_string() }
    }

    pub fn scan(&self, kind: ScanKind) -> String {
        format!("{}/scan/{}", self.root, kind.as_str())
    }

    pub fn restart(&self) -> String {
        format!("{}/scan/restart", self.root)
    }

    pub fn echo(&self) -> String {
        format!("{}/echo", self.root)
    }

    pub fn add_static_device(&self) -> String {
        format!("{}/setup/ADD STATIC DEVICE", self.root)
    }

    pub fn delete_static_device(&self) -> String {
        format!("{}/setup/DELETE STATIC DEVICE", self.root)
    }

    pub fn known_device_states(&self) -> String {
        format!("{}/KNOWN DEVICE STATES", self.root)
    }

    pub fn monitor_state(&self) -> String {
        format!("{}/state", self.root)
    }

    pub fn node_state(&self, location: &str) -> String {
        format!("{}/{}/state", self.root, location)
    }
}
