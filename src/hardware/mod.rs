// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/monitor-presence-rs

//! Hardware module - remote control of monitor nodes

mod ssh;

pub use ssh::SshHardwareControl;

use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::HardwareError;

pub const DEFAULT_REBOOT_COMMAND: &str = "sudo reboot now";

/// Login details for a monitor node, keyed by its location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteMonitor {
    pub host: String,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub reboot_command: Option<String>,
    /// Reboot the node if it stays offline for the system timeout
    #[serde(default)]
    pub auto_reboot_when_offline: bool,
    /// Time of day (`"03:30"`) an offline node is rebooted at, instead of
    /// after the system timeout
    #[serde(default)]
    pub time: Option<NaiveTime>,
}

impl RemoteMonitor {
    pub fn reboot_command(&self) -> &str {
        self.reboot_command.as_deref().unwrap_or(DEFAULT_REBOOT_COMMAND)
    }
}

/// Runs commands on monitor nodes
///
/// Calls may take as long as the node needs; the engine always runs them
/// on a separate task.
#[async_trait]
pub trait HardwareControl: Send + Sync {
    /// Reboot the node, returning whatever it printed
    async fn reboot(&self, node: &str) -> Result<String, HardwareError>;

    async fn run_command(&self, node: &str, cmd: &str) -> Result<String, HardwareError>;

    /// Nodes this controller has credentials for
    fn nodes(&self) -> Vec<String>;

    fn auto_reboot_when_offline(&self, node: &str) -> bool;

    /// Time of day an offline node should be rebooted at, if configured
    fn reboot_time(&self, _node: &str) -> Option<NaiveTime> {
        None
    }
}

/// Next moment the wall clock reads `at`: today unless that has already
/// passed, otherwise tomorrow.
pub fn next_occurrence(now: NaiveDateTime, at: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(at);
    if now > today {
        today + Duration::days(1)
    } else {
        today
    }
}
