// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/monitor-presence-rs

//! Scanner simulator for demo/testing
//!
//! Plays a fleet of monitor scanners on a [`MessageBus`]: answers echo
//! probes, runs scan cycles on request and reports confidence for a
//! handful of devices that wander in and out of the house.

use std::sync::Arc;
use std::time::Duration;
use futures::StreamExt;
use rand::prelude::*;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::{BusMessage, MessageBus};
use crate::error::BusError;
use crate::scanning::ScanKind;

/// A device the simulated scanners can see
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    pub mac: String,
    pub name: String,
    pub home: bool,
    /// Index of the location it is closest to while home
    pub nearest: usize,
}

/// Simulates a set of monitor scanners
pub struct MonitorSimulator {
    root: String,
    locations: Vec<String>,
    devices: Vec<SimulatedDevice>,
    rng: StdRng,
    wander_interval: Duration,
    wander_probability: f64,
}

impl MonitorSimulator {
    pub fn new(root: &str, locations: Vec<String>) -> Self {
        Self {
            root: root.trim_end_matches('/').to_string(),
            locations,
            devices: Vec::new(),
            rng: StdRng::from_entropy(),
            wander_interval: Duration::from_secs(20),
            wander_probability: 0.25,
        }
    }

    /// Default demo fleet: two scanners, three devices.
    pub fn demo(root: &str) -> Self {
        Self::new(root, vec!["living_room".to_string(), "garage".to_string()])
            .with_device("AA:BB:CC:00:00:01", "alice phone")
            .with_device("AA:BB:CC:00:00:02", "bob phone")
            .with_device("AA:BB:CC:00:00:03", "car keys")
    }

    pub fn with_device(mut self, mac: &str, name: &str) -> Self {
        let nearest = self.devices.len() % self.locations.len().max(1);
        self.devices.push(SimulatedDevice {
            mac: mac.to_string(),
            name: name.to_string(),
            home: true,
            nearest,
        });
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn devices(&self) -> &[SimulatedDevice] {
        &self.devices
    }

    /// Messages a scanner emits when it boots
    pub fn announce(&self) -> Vec<BusMessage> {
        self.locations
            .iter()
            .map(|loc| BusMessage::new(format!("{}/{}/status", self.root, loc), "online"))
            .collect()
    }

    /// Replies to an engine request, or nothing if the topic is not one
    /// the scanners act on.
    pub fn respond(&mut self, topic: &str) -> Vec<BusMessage> {
        if topic == format!("{}/echo", self.root) {
            return self
                .locations
                .iter()
                .map(|loc| BusMessage::new(format!("{}/{}/echo", self.root, loc), "ok"))
                .collect();
        }

        let Some(action) = topic.strip_prefix(&format!("{}/scan/", self.root)) else {
            return Vec::new();
        };
        match action.parse::<ScanKind>() {
            Ok(ScanKind::Rssi) => self.rssi_samples(),
            Ok(kind) => self.scan_cycle(kind),
            Err(_) => {
                debug!(action, "Simulator ignoring scan request");
                Vec::new()
            }
        }
    }

    /// Maybe move one device in or out; returns its fresh reports.
    pub fn wander(&mut self) -> Vec<BusMessage> {
        if self.devices.is_empty() || !self.rng.gen_bool(self.wander_probability) {
            return Vec::new();
        }
        let index = self.rng.gen_range(0..self.devices.len());
        let locations = self.locations.len().max(1);
        let device = &mut self.devices[index];
        device.home = !device.home;
        device.nearest = self.rng.gen_range(0..locations);
        info!(device = %device.name, home = device.home, "Simulated device moved");

        (0..self.locations.len())
            .map(|loc| self.report(index, loc, ScanKind::Arrive))
            .collect()
    }

    fn scan_cycle(&mut self, kind: ScanKind) -> Vec<BusMessage> {
        let mut messages = Vec::new();
        for loc in 0..self.locations.len() {
            let location = &self.locations[loc];
            messages.push(BusMessage::new(
                format!("{}/{}/{}/start", self.root, location, kind.as_str()),
                "",
            ));
            for device in 0..self.devices.len() {
                messages.push(self.report(device, loc, kind));
            }
            messages.push(BusMessage::new(
                format!("{}/{}/{}/end", self.root, self.locations[loc], kind.as_str()),
                "",
            ));
        }
        messages
    }

    fn rssi_samples(&mut self) -> Vec<BusMessage> {
        let mut messages = Vec::new();
        for (d, device) in self.devices.iter().enumerate() {
            if !device.home {
                continue;
            }
            for (loc, location) in self.locations.iter().enumerate() {
                let base = if loc == device.nearest { -55 } else { -80 };
                let rssi = base + self.rng.gen_range(-5..=5) + d as i32 % 3;
                messages.push(BusMessage::new(
                    format!("{}/{}/{}/rssi", self.root, location, device.mac),
                    rssi.to_string(),
                ));
            }
        }
        messages
    }

    fn report(&mut self, device: usize, loc: usize, kind: ScanKind) -> BusMessage {
        let d = &self.devices[device];
        let confidence: u8 = match (d.home, loc == d.nearest) {
            (true, true) => self.rng.gen_range(85..=100),
            (true, false) => self.rng.gen_range(40..=70),
            (false, _) => 0,
        };
        let mut body = json!({
            "id": d.mac,
            "name": d.name,
            "type": "KNOWN_MAC",
            "confidence": confidence.to_string(),
            "scan_type": kind.as_str(),
        });
        if confidence > 0 {
            body["rssi"] = json!(self.rng.gen_range(-90..=-45).to_string());
        }
        BusMessage::new(
            format!("{}/{}/{}", self.root, self.locations[loc], d.mac),
            body.to_string(),
        )
    }

    /// Run against `bus` until shutdown.
    pub async fn spawn(
        mut self,
        bus: Arc<dyn MessageBus>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<JoinHandle<()>, BusError> {
        let mut requests = futures::stream::select(
            bus.subscribe(&format!("{}/scan/#", self.root)).await?,
            bus.subscribe(&format!("{}/echo", self.root)).await?,
        );

        Ok(tokio::spawn(async move {
            let send = |messages: Vec<BusMessage>| {
                for msg in messages {
                    if let Err(e) = bus.publish(&msg.topic, &msg.payload, msg.retain) {
                        warn!("Simulator publish failed: {}", e);
                    }
                }
            };

            send(self.announce());
            let mut wander = tokio::time::interval(self.wander_interval);
            wander.tick().await;
            info!(scanners = self.locations.len(), devices = self.devices.len(), "Scanner simulator running");

            loop {
                tokio::select! {
                    Some(msg) = requests.next() => send(self.respond(&msg.topic)),
                    _ = wander.tick() => send(self.wander()),
                    _ = shutdown.recv() => break,
                }
            }
            debug!("Scanner simulator stopped");
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryBus;

    fn simulator() -> MonitorSimulator {
        MonitorSimulator::demo("monitor").with_seed(7)
    }

    #[test]
    fn echo_is_answered_by_every_scanner() {
        let replies = simulator().respond("monitor/echo");
        let topics: Vec<&str> = replies.iter().map(|m| m.topic.as_str()).collect();
        assert_eq!(topics, vec!["monitor/living_room/echo", "monitor/garage/echo"]);
        assert!(replies.iter().all(|m| m.payload == "ok"));
    }

    #[test]
    fn scan_cycle_is_bracketed_by_start_and_end() {
        let replies = simulator().respond("monitor/scan/arrive");
        assert_eq!(replies.first().unwrap().topic, "monitor/living_room/arrive/start");
        assert_eq!(replies.last().unwrap().topic, "monitor/garage/arrive/end");
        // per scanner: start, three reports, end
        assert_eq!(replies.len(), 2 * 5);
    }

    #[test]
    fn away_devices_report_zero_confidence() {
        let mut sim = simulator();
        sim.devices[0].home = false;
        let replies = sim.respond("monitor/scan/depart");
        let report = replies
            .iter()
            .find(|m| m.topic == "monitor/living_room/AA:BB:CC:00:00:01")
            .unwrap();
        let body: serde_json::Value = serde_json::from_str(&report.payload).unwrap();
        assert_eq!(body["confidence"], "0");
        assert!(body.get("rssi").is_none());
    }

    #[test]
    fn unrelated_topics_get_no_reply() {
        let mut sim = simulator();
        assert!(sim.respond("monitor/setup/ADD STATIC DEVICE").is_empty());
        assert!(sim.respond("monitor/scan/restart").is_empty());
    }

    #[tokio::test]
    async fn simulator_answers_over_the_bus() {
        let bus = Arc::new(MemoryBus::default());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = simulator().spawn(bus.clone(), shutdown_rx).await.unwrap();

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(bus.published_to("monitor/garage/status").len(), 1);

        bus.publish("monitor/echo", "", false).unwrap();
        for _ in 0..50 {
            if !bus.published_to("monitor/garage/echo").is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(bus.published_to("monitor/garage/echo").len(), 1);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
