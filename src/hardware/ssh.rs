// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/monitor-presence-rs

//! Hardware control over the system `ssh` client

use std::collections::BTreeMap;
use std::time::Duration;
use async_trait::async_trait;
use chrono::NaiveTime;
use tokio::process::Command;
use tracing::{debug, info};

use super::{HardwareControl, RemoteMonitor};
use crate::error::HardwareError;

pub struct SshHardwareControl {
    monitors: BTreeMap<String, RemoteMonitor>,
    connect_timeout: Duration,
}

impl SshHardwareControl {
    pub fn new(monitors: BTreeMap<String, RemoteMonitor>, connect_timeout: Duration) -> Self {
        Self { monitors, connect_timeout }
    }

    fn monitor(&self, node: &str) -> Result<&RemoteMonitor, HardwareError> {
        self.monitors
            .get(node)
            .ok_or_else(|| HardwareError::UnknownNode(node.to_string()))
    }

    /// `ssh` invocation for `cmd`; password logins go through `sshpass -e`
    /// so the secret never shows up in the process list.
    fn command(&self, monitor: &RemoteMonitor, cmd: &str) -> Command {
        let mut command = match &monitor.password {
            Some(password) => {
                let mut c = Command::new("sshpass");
                c.env("SSHPASS", password).arg("-e").arg("ssh");
                c
            }
            None => {
                let mut c = Command::new("ssh");
                c.args(["-o", "BatchMode=yes"]);
                c
            }
        };
        command
            .args(["-o", "StrictHostKeyChecking=accept-new"])
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)))
            .arg("-p")
            .arg(monitor.port.unwrap_or(22).to_string())
            .arg(format!("{}@{}", monitor.username, monitor.host))
            .arg(cmd)
            .kill_on_drop(true);
        command
    }

    async fn execute(&self, node: &str, cmd: &str) -> Result<String, HardwareError> {
        let monitor = self.monitor(node)?;
        info!("Running {} on {}'s hardware", cmd, node);

        let output = self
            .command(monitor, cmd)
            .output()
            .await
            .map_err(|source| HardwareError::Spawn {
                node: node.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(HardwareError::CommandFailed {
                node: node.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        debug!(node, output = %stdout.trim(), "Command completed");
        Ok(stdout)
    }
}

#[async_trait]
impl HardwareControl for SshHardwareControl {
    async fn reboot(&self, node: &str) -> Result<String, HardwareError> {
        let cmd = self.monitor(node)?.reboot_command().to_string();
        self.execute(node, &cmd).await
    }

    async fn run_command(&self, node: &str, cmd: &str) -> Result<String, HardwareError> {
        self.execute(node, cmd).await
    }

    fn nodes(&self) -> Vec<String> {
        self.monitors.keys().cloned().collect()
    }

    fn auto_reboot_when_offline(&self, node: &str) -> bool {
        self.monitors
            .get(node)
            .map(|m| m.auto_reboot_when_offline)
            .unwrap_or(false)
    }

    fn reboot_time(&self, node: &str) -> Option<NaiveTime> {
        self.monitors.get(node).and_then(|m| m.time)
    }
}
