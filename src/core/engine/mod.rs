// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/monitor-presence-rs

//! Presence engine
//!
//! One task owns every piece of mutable state. Bus messages, timer
//! firings, external commands and finished hardware jobs all arrive on
//! channels and are handled one at a time, so no handler ever observes a
//! half-applied update from another.

mod health;
mod nodes;
mod presence;
mod scans;

#[cfg(test)]
mod tests;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use futures::stream::{self, StreamExt};
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace, warn};

use super::event_bus::EventBus;
use super::scheduler::{Scheduler, TimerFired};
use crate::bus::{BusMessage, MessageBus};
use crate::config::{parse_pairs, Config, GatewayConfig, PresenceConfig};
use crate::entities::{attrs, EntityNames, EntityStore};
use crate::error::{ConfigError, HardwareError, PresenceError, ProtocolError, Result};
use crate::hardware::HardwareControl;
use crate::health::HealthMonitor;
use crate::presence::{
    normalize_location, title_case, ConfidenceAggregator, Device, DeviceClass, DeviceKey,
    HouseholdAggregator,
};
use crate::protocol::{Inbound, MessageRouter, Topics};
use crate::scanning::{ScanCoordinator, ScanKind};

/// Gap between consecutive known-device publications
const KNOWN_DEVICE_SPACING: Duration = Duration::from_secs(3);
/// Delay before asking the scanners to re-announce device states at startup
const STARTUP_RELOAD_DELAY: Duration = Duration::from_secs(5);
/// A new location gets the known-device list after this delay
const NEW_LOCATION_LOAD_DELAY: Duration = Duration::from_secs(30);
const FIRST_ECHO_DELAY: Duration = Duration::from_secs(1);
const FALLBACK_ARRIVE_DELAY: Duration = Duration::from_secs(1);
const FALLBACK_DEPART_DELAY: Duration = Duration::from_secs(2);
/// Extra grace on top of system_timeout before the first location sweep
const SWEEP_GRACE: Duration = Duration::from_secs(30);

pub(crate) const MONITOR_FRIENDLY_NAME: &str = "Monitor System State";

/// Everything the engine can have pending on its timer wheel
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum TimerKey {
    Debounce(DeviceKey),
    LocationCleanup(String),
    NodeReboot(String),
    DepartScan,
    Motion,
    GatewayRecheck,
    FallbackArrive,
    FallbackDepart,
    EchoProbe,
    LocationSweep,
    PublishKnownDevice(usize),
    LoadKnownDevices,
    ReloadDeviceState,
}

/// Operator-facing operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    RunArriveScan,
    /// `None` waits the configured depart check time
    RunDepartScan { delay: Option<Duration> },
    RunRssiScan,
    /// `None` asks every scanner to restart its script; otherwise a node
    /// name, a comma separated list or `all` reboots hardware
    RestartDevice { location: Option<String> },
    RunNodeCommand { location: String, cmd: String },
    ReloadDeviceState,
    LoadKnownDevices,
    RemoveKnownDevice { device: String },
    ClearLocation { location: String },
    Motion { source: String },
    Gateway { source: String, open: bool },
}

/// Cloneable way in to a running engine
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<EngineCommand>,
    events: Arc<EventBus>,
}

impl EngineHandle {
    pub async fn send(&self, command: EngineCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| PresenceError::EngineStopped)
    }

    pub fn try_send(&self, command: EngineCommand) -> Result<()> {
        self.commands.try_send(command).map_err(|e| match e {
            mpsc::error::TrySendError::Closed(_) => PresenceError::EngineStopped,
            mpsc::error::TrySendError::Full(cmd) => {
                warn!("Engine command queue full, dropping {:?}", cmd);
                PresenceError::EngineStopped
            }
        })
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }
}

/// Result of a hardware job, sent back to the engine task
#[derive(Debug)]
pub(crate) struct HardwareOutcome {
    pub node: String,
    pub job: HardwareJob,
    pub result: std::result::Result<String, HardwareError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HardwareJob {
    Reboot,
    Command(String),
}

enum Input {
    Message(BusMessage),
    Timer(TimerFired<TimerKey>),
    Command(EngineCommand),
    Hardware(HardwareOutcome),
}

/// Presence reconciliation engine
pub struct Engine {
    presence: PresenceConfig,
    gateway: GatewayConfig,
    router: MessageRouter,
    topics: Topics,
    names: EntityNames,
    bus: Arc<dyn MessageBus>,
    store: Arc<dyn EntityStore>,
    hardware: Arc<dyn HardwareControl>,
    events: Arc<EventBus>,

    scheduler: Scheduler<TimerKey>,
    timer_rx: mpsc::UnboundedReceiver<TimerFired<TimerKey>>,
    command_tx: mpsc::Sender<EngineCommand>,
    command_rx: mpsc::Receiver<EngineCommand>,
    hardware_tx: mpsc::UnboundedSender<HardwareOutcome>,
    hardware_rx: mpsc::UnboundedReceiver<HardwareOutcome>,

    confidence: ConfidenceAggregator,
    household: HouseholdAggregator,
    scans: ScanCoordinator,
    health: HealthMonitor,

    /// `"<id> <name>"` entries announced to the scanners
    known_devices: Vec<String>,
    /// Locations that have delivered readings since the last sweep
    locations: BTreeSet<String>,
    busy_nodes: HashSet<String>,
    /// Attempt number the pending depart timer will run with
    depart_attempt: u32,
    gateway_open: HashMap<String, bool>,
}

impl Engine {
    pub fn new(
        config: &Config,
        bus: Arc<dyn MessageBus>,
        store: Arc<dyn EntityStore>,
        hardware: Arc<dyn HardwareControl>,
    ) -> std::result::Result<Self, ConfigError> {
        let router = MessageRouter::from_config(config)?;
        let known = parse_pairs(&config.known_devices, "known_devices")?;

        let mut confidence = ConfidenceAggregator::new(config.presence.minimum_confidence);
        for (id, name) in &known {
            let key = DeviceKey::from_topic_id(id, router.known_beacons());
            confidence.register(
                Device::new(key, DeviceClass::KnownMac)
                    .with_id(id.clone())
                    .with_name(title_case(name)),
            );
        }

        let (scheduler, timer_rx) = Scheduler::new();
        let (command_tx, command_rx) = mpsc::channel(64);
        let (hardware_tx, hardware_rx) = mpsc::unbounded_channel();

        Ok(Self {
            presence: config.presence.clone(),
            gateway: config.gateway.clone(),
            topics: Topics::new(&config.presence.monitor_topic),
            names: EntityNames::from_config(&config.presence),
            router,
            bus,
            store,
            hardware,
            events: Arc::new(EventBus::default()),
            scheduler,
            timer_rx,
            command_tx,
            command_rx,
            hardware_tx,
            hardware_rx,
            confidence,
            household: HouseholdAggregator::new(),
            scans: ScanCoordinator::new(config.presence.depart_scans),
            health: HealthMonitor::new(),
            known_devices: known.iter().map(|(id, name)| format!("{} {}", id, name)).collect(),
            locations: BTreeSet::new(),
            busy_nodes: HashSet::new(),
            depart_attempt: 1,
            gateway_open: HashMap::new(),
        })
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            commands: self.command_tx.clone(),
            events: self.events.clone(),
        }
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    pub fn names(&self) -> &EntityNames {
        &self.names
    }

    /// Subscribe, run the startup sequence and process input until
    /// shutdown or until the bus closes.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let mut streams = Vec::new();
        for pattern in self.router.subscriptions() {
            streams.push(self.bus.subscribe(&pattern).await?);
        }
        let mut inbound = stream::select_all(streams);

        self.start();
        info!("Presence engine running");

        loop {
            let input = tokio::select! {
                msg = inbound.next() => match msg {
                    Some(msg) => Input::Message(msg),
                    None => {
                        warn!("Message bus closed, stopping engine");
                        break;
                    }
                },
                Some(fired) = self.timer_rx.recv() => Input::Timer(fired),
                Some(command) = self.command_rx.recv() => Input::Command(command),
                Some(outcome) = self.hardware_rx.recv() => Input::Hardware(outcome),
                _ = shutdown.recv() => {
                    info!("Shutdown requested");
                    break;
                }
            };

            match input {
                Input::Message(msg) => self.on_message(&msg),
                Input::Timer(fired) => self.on_timer(fired),
                Input::Command(command) => self.on_command(command),
                Input::Hardware(outcome) => self.on_hardware(outcome),
            }
        }

        self.scheduler.cancel_all();
        info!("Presence engine stopped");
        Ok(())
    }

    /// Startup sequence: entities, known devices, periodic timers.
    pub(crate) fn start(&mut self) {
        self.store.set(
            &self.names.monitor(),
            Some("idle"),
            attrs([
                ("friendly_name", json!(MONITOR_FRIENDLY_NAME)),
                ("version", json!(crate::VERSION)),
                ("locations", json!([])),
                ("nodes", json!(0)),
                ("online_nodes", json!([])),
                ("offline_nodes", json!([])),
            ]),
        );
        for (entity, label) in [
            (self.names.everyone_home(), &self.presence.everyone_home),
            (self.names.everyone_not_home(), &self.presence.everyone_not_home),
            (self.names.somebody_is_home(), &self.presence.somebody_is_home),
        ] {
            self.store.set(
                &entity,
                None,
                attrs([
                    ("friendly_name", json!(title_case(label))),
                    ("device_class", json!("presence")),
                ]),
            );
        }
        self.recompute_household();

        self.load_known_devices();
        self.scheduler.schedule(TimerKey::ReloadDeviceState, STARTUP_RELOAD_DELAY);

        if self.presence.health_checks_enabled() {
            self.scheduler.schedule_every(
                TimerKey::EchoProbe,
                FIRST_ECHO_DELAY,
                self.presence.system_check(),
            );
        } else {
            warn!(
                system_timeout = self.presence.system_timeout_secs,
                system_check = self.presence.system_check_secs,
                "Scanner health checks disabled; system_timeout must exceed system_check"
            );
        }

        if self.gateway.topics.is_empty() {
            let period = Duration::from_secs(self.gateway.fallback_scan_interval_secs.max(1));
            self.scheduler
                .schedule_every(TimerKey::FallbackArrive, FALLBACK_ARRIVE_DELAY, period);
            self.scheduler
                .schedule_every(TimerKey::FallbackDepart, FALLBACK_DEPART_DELAY, period);
        }

        self.scheduler.schedule_every(
            TimerKey::LocationSweep,
            self.presence.system_timeout() + SWEEP_GRACE,
            self.presence.location_clean_interval(),
        );
    }

    pub(crate) fn on_message(&mut self, msg: &BusMessage) {
        match self.router.route(&msg.topic, &msg.payload) {
            Ok(inbound) => self.dispatch(inbound),
            Err(ProtocolError::ForeignTopic(topic)) => trace!("Ignoring foreign topic {}", topic),
            Err(e) => debug!(topic = %msg.topic, "Dropping message: {}", e),
        }
    }

    fn dispatch(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Confidence(reading) => self.on_reading(reading),
            Inbound::SignalStrength { device, location, strength } => {
                self.on_signal(device, &location, strength)
            }
            Inbound::Status { location, liveness } => self.on_status(&location, liveness),
            Inbound::Echo { location, ok } => self.on_echo(&location, ok),
            Inbound::ScanStarted { location, scan_type } => self.on_scan_started(&location, &scan_type),
            Inbound::ScanEnded { location, .. } => self.on_scan_ended(&location),
            Inbound::RunScan(ScanKind::Arrive) => self.request_arrive_scan(),
            Inbound::RunScan(ScanKind::Depart) => self.request_depart_scan(Duration::ZERO, 1),
            Inbound::RunScan(ScanKind::Rssi) => self.request_rssi_scan(),
            Inbound::Restart => info!("The entire presence system is restarting"),
            Inbound::Reboot { location } => self.restart_device(Some(&location)),
            Inbound::Gateway { source, open } => self.on_gateway(source, open),
            Inbound::Motion { source } => self.on_motion(&source),
            Inbound::Ignored(reason) => trace!("Ignored message: {}", reason),
        }
    }

    pub(crate) fn on_timer(&mut self, fired: TimerFired<TimerKey>) {
        if !self.scheduler.claim(&fired) {
            return;
        }
        match fired.key {
            TimerKey::Debounce(device) => self.on_debounce_expired(&device),
            TimerKey::LocationCleanup(location) => self.on_cleanup_expired(&location),
            TimerKey::NodeReboot(node) => self.on_auto_reboot(&node),
            TimerKey::DepartScan => self.on_depart_timer(),
            TimerKey::Motion => self.request_rssi_scan(),
            TimerKey::GatewayRecheck => self.on_gateway_recheck(),
            TimerKey::FallbackArrive => self.request_arrive_scan(),
            TimerKey::FallbackDepart => {
                self.request_depart_scan(self.presence.depart_check_time(), 1)
            }
            TimerKey::EchoProbe => self.publish(&self.topics.echo(), ""),
            TimerKey::LocationSweep => self.sweep_locations(),
            TimerKey::PublishKnownDevice(index) => self.publish_known_device(index),
            TimerKey::LoadKnownDevices => self.load_known_devices(),
            TimerKey::ReloadDeviceState => self.reload_device_state(),
        }
    }

    pub(crate) fn on_command(&mut self, command: EngineCommand) {
        debug!("Command: {:?}", command);
        match command {
            EngineCommand::RunArriveScan => self.request_arrive_scan(),
            EngineCommand::RunDepartScan { delay } => {
                let delay = delay.unwrap_or_else(|| self.presence.depart_check_time());
                self.request_depart_scan(delay, 1)
            }
            EngineCommand::RunRssiScan => self.request_rssi_scan(),
            EngineCommand::RestartDevice { location } => self.restart_device(location.as_deref()),
            EngineCommand::RunNodeCommand { location, cmd } => self.run_node_command(&location, &cmd),
            EngineCommand::ReloadDeviceState => self.reload_device_state(),
            EngineCommand::LoadKnownDevices => self.load_known_devices(),
            EngineCommand::RemoveKnownDevice { device } => self.remove_known_device(&device),
            EngineCommand::ClearLocation { location } => {
                self.clear_location(&normalize_location(&location))
            }
            EngineCommand::Motion { source } => self.on_motion(&source),
            EngineCommand::Gateway { source, open } => self.on_gateway(source, open),
        }
    }

    /// Publish, logging instead of failing; the next cycle re-derives
    /// anything a lost message would have carried.
    fn publish(&self, topic: &str, payload: &str) {
        if let Err(e) = self.bus.publish(topic, payload, false) {
            warn!("{}", e);
        }
    }

    /// Send the known-device list, one entry per spacing interval.
    pub(crate) fn load_known_devices(&mut self) {
        if self.known_devices.is_empty() {
            return;
        }
        info!(count = self.known_devices.len(), "Publishing known devices");
        self.publish_known_device(0);
        for index in 1..self.known_devices.len() {
            self.scheduler
                .schedule(TimerKey::PublishKnownDevice(index), KNOWN_DEVICE_SPACING * index as u32);
        }
    }

    fn publish_known_device(&self, index: usize) {
        if let Some(entry) = self.known_devices.get(index) {
            self.publish(&self.topics.add_static_device(), entry);
        }
    }

    pub(crate) fn reload_device_state(&self) {
        debug!("Requesting known device states");
        self.publish(&self.topics.known_device_states(), "");
    }
}
