// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/monitor-presence-rs

//! Restarts, reboots and remote commands on monitor nodes

use chrono::{SecondsFormat, Utc};
use serde_json::json;
use tracing::{error, info, warn};

use super::{Engine, HardwareJob, HardwareOutcome};
use crate::entities::attrs;
use crate::error::HardwareError;
use crate::presence::normalize_location;

impl Engine {
    /// Without a location every scanner restarts its script. With one, the
    /// named nodes (or `all`) are rebooted over the hardware channel.
    pub(super) fn restart_device(&mut self, location: Option<&str>) {
        let Some(location) = location else {
            info!("Restarting all scanner scripts");
            self.publish(&self.topics.restart(), "");
            return;
        };
        for node in self.resolve_nodes(location) {
            self.spawn_job(node, HardwareJob::Reboot);
        }
    }

    pub(super) fn run_node_command(&mut self, location: &str, cmd: &str) {
        for node in self.resolve_nodes(location) {
            self.spawn_job(node, HardwareJob::Command(cmd.to_string()));
        }
    }

    /// Scheduled reboot of a node that stayed offline.
    pub(super) fn on_auto_reboot(&mut self, node: &str) {
        self.set_node_attributes(node, attrs([("reboot_scheduled", json!("off"))]));
        info!(node, "Rebooting offline scanner");
        self.restart_device(Some(node));
    }

    /// `all`, a single node or a comma separated list; unknown names are
    /// logged and skipped.
    fn resolve_nodes(&self, location: &str) -> Vec<String> {
        let configured = self.hardware.nodes();
        if location.trim().eq_ignore_ascii_case("all") {
            return configured;
        }

        let mut nodes = Vec::new();
        for wanted in location.split(',').map(normalize_location).filter(|n| !n.is_empty()) {
            match configured.iter().find(|n| normalize_location(n) == wanted) {
                Some(node) => nodes.push(node.clone()),
                None => warn!("{}", HardwareError::UnknownNode(wanted)),
            }
        }
        nodes
    }

    fn spawn_job(&mut self, node: String, job: HardwareJob) {
        if !self.busy_nodes.insert(node.clone()) {
            warn!("{}", HardwareError::Busy { node });
            return;
        }

        let hardware = self.hardware.clone();
        let results = self.hardware_tx.clone();
        tokio::spawn(async move {
            let result = match &job {
                HardwareJob::Reboot => hardware.reboot(&node).await,
                HardwareJob::Command(cmd) => hardware.run_command(&node, cmd).await,
            };
            let _ = results.send(HardwareOutcome { node, job, result });
        });
    }

    pub(crate) fn on_hardware(&mut self, outcome: HardwareOutcome) {
        self.busy_nodes.remove(&outcome.node);
        match (&outcome.job, outcome.result) {
            (HardwareJob::Reboot, Ok(_)) => {
                info!(node = %outcome.node, "Scanner rebooted");
                self.set_node_attributes(
                    &normalize_location(&outcome.node),
                    attrs([(
                        "last_rebooted",
                        json!(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
                    )]),
                );
            }
            (HardwareJob::Command(cmd), Ok(output)) => {
                info!(node = %outcome.node, cmd = %cmd, "Command finished: {}", output.trim());
            }
            (job, Err(e)) => {
                error!(node = %outcome.node, job = ?job, "{}", e);
                self.events.publish_alert("error", &e.to_string());
            }
        }
    }
}
