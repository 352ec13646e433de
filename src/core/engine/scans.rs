// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/monitor-presence-rs

//! Scan requests and the fleet's scan cycle

use std::time::Duration;
use serde_json::json;
use tracing::{debug, info, trace};

use super::{Engine, TimerKey};
use crate::entities::attrs;
use crate::presence::title_case;
use crate::scanning::{ArriveDecision, DepartDecision, ScanEnd, ScanKind};

impl Engine {
    /// Arrival scans go out immediately when the fleet is idle; otherwise
    /// a single deferred request waits for the next idle transition.
    pub(super) fn request_arrive_scan(&mut self) {
        match self.scans.request_arrive() {
            ArriveDecision::PublishNow => {
                debug!("Requesting arrive scan");
                self.publish(&self.topics.scan(ScanKind::Arrive), "");
            }
            ArriveDecision::Deferred => debug!("Scanners busy, arrive scan deferred"),
            ArriveDecision::Coalesced => trace!("Arrive scan already pending"),
        }
    }

    /// (Re)arm the single departure timer. A later request always
    /// supersedes an earlier one.
    pub(super) fn request_depart_scan(&mut self, delay: Duration, attempt: u32) {
        self.depart_attempt = attempt;
        self.scheduler.schedule(TimerKey::DepartScan, delay);
    }

    pub(super) fn on_depart_timer(&mut self) {
        match self.scans.depart_fired(self.depart_attempt) {
            DepartDecision::Publish { next_attempt } => {
                debug!(attempt = self.depart_attempt, "Requesting depart scan");
                self.publish(&self.topics.scan(ScanKind::Depart), "");
                if let Some(next) = next_attempt {
                    self.request_depart_scan(self.presence.depart_check_time(), next);
                }
            }
            DepartDecision::Retry { attempt } => {
                debug!(attempt, "Scanners busy, retrying depart scan");
                self.request_depart_scan(self.presence.depart_busy_backoff(), attempt);
            }
        }
    }

    /// RSSI scans are never gated on the fleet being idle.
    pub(super) fn request_rssi_scan(&self) {
        debug!("Requesting rssi scan");
        self.publish(&self.topics.scan(ScanKind::Rssi), "");
    }

    pub(super) fn on_scan_started(&mut self, location: &str, scan_type: &str) {
        self.scans.start(location, scan_type);
        self.update_monitor_entity();
        self.events.publish_scan_state(self.scans.phase());
    }

    pub(super) fn on_scan_ended(&mut self, location: &str) {
        let end = self.scans.end(location);
        self.after_scan_end(end);
    }

    pub(super) fn after_scan_end(&mut self, end: ScanEnd) {
        self.update_monitor_entity();
        if end.became_idle {
            self.events.publish_scan_state(self.scans.phase());
        }
        if end.release_arrive {
            debug!("Scanners idle, sending deferred arrive scan");
            self.publish(&self.topics.scan(ScanKind::Arrive), "");
        }
    }

    /// Motion restarts the quiet-period timer; the RSSI scan runs once
    /// motion has stopped for `rssi_timeout`.
    pub(super) fn on_motion(&mut self, source: &str) {
        trace!(source, "Motion detected");
        self.scheduler.schedule(TimerKey::Motion, self.presence.rssi_timeout());
    }

    pub(super) fn on_gateway(&mut self, source: String, open: bool) {
        if self.gateway_open.insert(source.clone(), open) == Some(open) {
            trace!(source = %source, open, "Gateway state unchanged");
            return;
        }
        info!(source = %source, open, "Gateway changed, checking presence");
        self.check_and_run_scans(open, true);
    }

    pub(super) fn on_gateway_recheck(&mut self) {
        if self.gateway_open.values().any(|open| *open) {
            self.check_and_run_scans(true, false);
        } else {
            debug!("All gateways closed, stopping periodic scan checks");
        }
    }

    /// Pick the scans the household state calls for, and while a gateway
    /// stays open keep re-checking on the configured interval.
    fn check_and_run_scans(&mut self, open: bool, first_time: bool) {
        let household = self.household.current().unwrap_or_default();
        if household.everyone_not_home {
            self.request_arrive_scan();
        } else if household.everyone_home {
            self.request_depart_scan(self.presence.depart_check_time(), 1);
        } else {
            self.request_arrive_scan();
            self.request_depart_scan(self.presence.depart_check_time(), 1);
        }

        let Some(interval) = self.gateway.scan_interval_secs else {
            return;
        };
        if !open {
            if !self.gateway_open.values().any(|open| *open) {
                self.scheduler.cancel(&TimerKey::GatewayRecheck);
            }
            return;
        }
        let delay = match self.gateway.scan_interval_delay_secs {
            Some(delay) if first_time => delay,
            _ => interval,
        };
        self.scheduler
            .schedule(TimerKey::GatewayRecheck, Duration::from_secs(delay));
    }

    /// Mirror scan state and node lists onto the monitor entity.
    pub(super) fn update_monitor_entity(&self) {
        let phase = self.scans.phase();
        let locations: Vec<String> = self.scans.active_locations().map(|l| title_case(l)).collect();
        let mut attributes = attrs([
            ("locations", json!(locations)),
            ("nodes", json!(self.health.node_count())),
            ("online_nodes", json!(self.health.online_nodes())),
            ("offline_nodes", json!(self.health.offline_nodes())),
        ]);
        if let Some(scan_type) = self.scans.scan_type() {
            attributes.insert("scan_type".into(), json!(scan_type));
        }
        self.store
            .set(&self.names.monitor(), Some(phase.as_str()), attributes);
    }
}
