// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/monitor-presence-rs

use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveTime};
use parking_lot::Mutex;
use serde_json::json;
use tokio::task::yield_now;

use super::*;
use crate::bus::MemoryBus;
use crate::config::OfflinePolicy;
use crate::entities::{spawn_state_mirror, MemoryEntityStore};

const PHONE: &str = "binary_sensor.monitor_aa_bb";
const ARRIVE: &str = "monitor/scan/arrive";
const DEPART: &str = "monitor/scan/depart";
const RSSI: &str = "monitor/scan/rssi";

#[derive(Default)]
struct RecordingHardware {
    nodes: Vec<String>,
    auto_reboot: bool,
    reboot_at: Option<NaiveTime>,
    calls: Mutex<Vec<(String, String)>>,
}

impl RecordingHardware {
    fn with_nodes(nodes: &[&str], auto_reboot: bool) -> Self {
        Self {
            nodes: nodes.iter().map(|n| n.to_string()).collect(),
            auto_reboot,
            reboot_at: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn rebooting_at(mut self, time: NaiveTime) -> Self {
        self.reboot_at = Some(time);
        self
    }

    fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl HardwareControl for RecordingHardware {
    async fn reboot(&self, node: &str) -> std::result::Result<String, HardwareError> {
        self.calls.lock().push((node.to_string(), "reboot".to_string()));
        Ok(String::new())
    }

    async fn run_command(&self, node: &str, cmd: &str) -> std::result::Result<String, HardwareError> {
        self.calls.lock().push((node.to_string(), cmd.to_string()));
        Ok("done".to_string())
    }

    fn nodes(&self) -> Vec<String> {
        self.nodes.clone()
    }

    fn auto_reboot_when_offline(&self, node: &str) -> bool {
        self.auto_reboot && self.nodes.iter().any(|n| n == node)
    }

    fn reboot_time(&self, _node: &str) -> Option<NaiveTime> {
        self.reboot_at
    }
}

struct Harness {
    engine: Engine,
    bus: Arc<MemoryBus>,
    store: Arc<MemoryEntityStore>,
    hardware: Arc<RecordingHardware>,
}

fn config() -> Config {
    let mut config = Config::default();
    config.gateway.topics = vec!["home/front_door".to_string()];
    config
}

fn harness() -> Harness {
    harness_with(config(), RecordingHardware::default())
}

fn harness_with(config: Config, hardware: RecordingHardware) -> Harness {
    let bus = Arc::new(MemoryBus::default());
    let store = Arc::new(MemoryEntityStore::new());
    let hardware = Arc::new(hardware);
    let mut engine = Engine::new(&config, bus.clone(), store.clone(), hardware.clone()).unwrap();
    engine.start();
    Harness { engine, bus, store, hardware }
}

impl Harness {
    fn send(&mut self, topic: &str, payload: &str) {
        self.engine.on_message(&BusMessage::new(topic, payload));
    }

    fn report(&mut self, location: &str, confidence: u8) {
        let payload = json!({"type": "KNOWN_MAC", "confidence": confidence.to_string(), "name": "phone"});
        self.send(&format!("monitor/{}/AA:BB", location), &payload.to_string());
    }

    fn command(&mut self, command: EngineCommand) {
        self.engine.on_command(command);
    }

    /// Let spawned timers and hardware jobs run, then feed their results
    /// back the way the run loop would.
    async fn settle(&mut self) {
        loop {
            for _ in 0..8 {
                yield_now().await;
            }
            let mut progressed = false;
            while let Ok(fired) = self.engine.timer_rx.try_recv() {
                self.engine.on_timer(fired);
                progressed = true;
            }
            while let Ok(outcome) = self.engine.hardware_rx.try_recv() {
                self.engine.on_hardware(outcome);
                progressed = true;
            }
            if !progressed {
                break;
            }
        }
    }

    async fn advance(&mut self, secs: u64) {
        self.settle().await;
        for _ in 0..secs {
            tokio::time::advance(Duration::from_secs(1)).await;
            self.settle().await;
        }
    }

    fn count(&self, topic: &str) -> usize {
        self.bus.published_to(topic).len()
    }

    fn state(&self, entity: &str) -> Option<String> {
        self.store.state_of(entity)
    }

    fn attribute(&self, entity: &str, name: &str) -> Option<serde_json::Value> {
        self.store.get(entity).and_then(|e| e.attribute(name).cloned())
    }
}

#[tokio::test(start_paused = true)]
async fn first_report_commits_home_and_asks_for_rssi() {
    let mut h = harness();
    h.report("kitchen", 90);
    h.settle().await;

    assert_eq!(h.state(PHONE).as_deref(), Some("on"));
    assert_eq!(h.state("binary_sensor.somebody_is_home").as_deref(), Some("on"));
    assert_eq!(h.attribute("binary_sensor.somebody_is_home", "count"), Some(json!(1)));
    assert_eq!(h.state("binary_sensor.everyone_home").as_deref(), Some("on"));
    assert_eq!(h.state("binary_sensor.everyone_not_home").as_deref(), Some("off"));
    assert_eq!(h.state("sensor.monitor_aa_bb_kitchen_conf").as_deref(), Some("90"));
    assert_eq!(h.count(RSSI), 1);
}

#[tokio::test(start_paused = true)]
async fn away_is_committed_only_after_the_debounce() {
    let mut h = harness();
    h.report("kitchen", 90);
    h.report("kitchen", 0);
    h.settle().await;

    assert_eq!(h.count(ARRIVE), 1);
    h.advance(29).await;
    assert_eq!(h.state(PHONE).as_deref(), Some("on"));

    h.advance(2).await;
    assert_eq!(h.state(PHONE).as_deref(), Some("off"));
    assert_eq!(h.state("binary_sensor.everyone_not_home").as_deref(), Some("on"));
    assert_eq!(h.attribute(PHONE, "nearest_monitor"), Some(json!("unknown")));
}

#[tokio::test(start_paused = true)]
async fn recovery_within_the_debounce_keeps_the_device_home() {
    let mut h = harness();
    h.report("kitchen", 90);
    h.report("kitchen", 10);
    h.advance(10).await;
    h.report("kitchen", 80);
    h.advance(60).await;

    assert_eq!(h.state(PHONE).as_deref(), Some("on"));
    assert!(!h.engine.scheduler.is_pending(&TimerKey::Debounce(DeviceKey::new("aa_bb"))));
}

#[tokio::test(start_paused = true)]
async fn any_confident_location_keeps_the_device_home() {
    let mut h = harness();
    h.report("kitchen", 90);
    h.report("garage", 80);
    h.report("kitchen", 0);
    h.advance(40).await;

    assert_eq!(h.state(PHONE).as_deref(), Some("on"));
    assert_eq!(h.count(ARRIVE), 0);
}

#[tokio::test(start_paused = true)]
async fn arrive_scans_wait_for_idle_and_collapse_into_one() {
    let mut h = harness();
    h.send("monitor/garage/depart/start", "");
    h.command(EngineCommand::RunArriveScan);
    h.command(EngineCommand::RunArriveScan);
    assert_eq!(h.count(ARRIVE), 0);
    assert_eq!(h.state("monitor.monitor_state").as_deref(), Some("scanning"));

    h.send("monitor/garage/depart/end", "");
    assert_eq!(h.count(ARRIVE), 1);
    assert_eq!(h.state("monitor.monitor_state").as_deref(), Some("idle"));
}

#[tokio::test(start_paused = true)]
async fn arrive_requests_during_an_arrival_scan_are_dropped() {
    let mut h = harness();
    h.send("monitor/garage/arrive/start", "");
    h.command(EngineCommand::RunArriveScan);
    h.send("monitor/garage/arrive/end", "");
    assert_eq!(h.count(ARRIVE), 0);
}

#[tokio::test(start_paused = true)]
async fn depart_requests_supersede_each_other() {
    let mut h = harness();
    h.command(EngineCommand::RunDepartScan { delay: Some(Duration::from_secs(10)) });
    h.advance(5).await;
    h.command(EngineCommand::RunDepartScan { delay: Some(Duration::from_secs(10)) });
    h.advance(6).await;
    assert_eq!(h.count(DEPART), 0);

    h.advance(5).await;
    assert_eq!(h.count(DEPART), 1);
}

#[tokio::test(start_paused = true)]
async fn depart_scans_repeat_up_to_the_configured_count() {
    let mut config = config();
    config.presence.depart_scans = 2;
    let mut h = harness_with(config, RecordingHardware::default());

    h.command(EngineCommand::RunDepartScan { delay: Some(Duration::ZERO) });
    h.advance(200).await;
    assert_eq!(h.count(DEPART), 3);
}

#[tokio::test(start_paused = true)]
async fn depart_scan_backs_off_while_busy() {
    let mut config = config();
    config.presence.depart_scans = 0;
    let mut h = harness_with(config, RecordingHardware::default());

    h.send("monitor/garage/arrive/start", "");
    h.command(EngineCommand::RunDepartScan { delay: Some(Duration::ZERO) });
    h.advance(5).await;
    assert_eq!(h.count(DEPART), 0);

    h.send("monitor/garage/arrive/end", "");
    h.advance(6).await;
    assert_eq!(h.count(DEPART), 1);
}

#[tokio::test(start_paused = true)]
async fn silent_scanner_readings_are_cleared_after_the_timeout() {
    let mut h = harness();
    h.send("monitor/garage/status", "online");
    h.report("garage", 90);
    h.send("monitor/garage/status", "offline");

    h.advance(59).await;
    assert_eq!(h.state("sensor.monitor_aa_bb_garage_conf").as_deref(), Some("90"));

    h.advance(2).await;
    assert_eq!(h.state("sensor.monitor_aa_bb_garage_conf").as_deref(), Some("unknown"));
    assert_eq!(h.state("monitor.garage_state").as_deref(), Some("offline"));
    assert_eq!(h.state(PHONE).as_deref(), Some("on"));

    h.advance(31).await;
    assert_eq!(h.state(PHONE).as_deref(), Some("off"));
}

#[tokio::test(start_paused = true)]
async fn coming_back_online_cancels_cleanup_and_reloads_states() {
    let mut h = harness();
    h.send("monitor/garage/status", "online");
    h.report("garage", 90);
    h.send("monitor/garage/status", "offline");
    h.advance(30).await;
    let reloads = h.count("monitor/KNOWN DEVICE STATES");
    h.send("monitor/garage/status", "online");
    h.advance(60).await;

    assert_eq!(h.state("sensor.monitor_aa_bb_garage_conf").as_deref(), Some("90"));
    assert_eq!(h.count("monitor/KNOWN DEVICE STATES"), reloads + 1);
    assert_eq!(h.attribute("monitor.monitor_state", "online_nodes"), Some(json!(["Garage"])));
}

#[tokio::test(start_paused = true)]
async fn echo_replies_keep_a_scanner_alive() {
    let mut h = harness();
    h.report("garage", 90);
    h.send("monitor/garage/echo", "ok");
    h.advance(50).await;
    assert!(h.count("monitor/echo") >= 2);

    h.send("monitor/garage/echo", "ok");
    h.advance(50).await;
    assert_eq!(h.state("sensor.monitor_aa_bb_garage_conf").as_deref(), Some("90"));

    h.advance(20).await;
    assert_eq!(h.state("sensor.monitor_aa_bb_garage_conf").as_deref(), Some("unknown"));
}

#[tokio::test(start_paused = true)]
async fn rescan_policy_requests_an_arrive_scan_after_clearing() {
    let mut config = config();
    config.presence.offline_policy = OfflinePolicy::ClearAndRescan;
    let mut h = harness_with(config, RecordingHardware::default());

    h.send("monitor/attic/status", "offline");
    h.advance(61).await;
    assert_eq!(h.count(ARRIVE), 1);
}

#[tokio::test(start_paused = true)]
async fn gateway_scans_follow_the_household_state() {
    let mut h = harness();
    h.send("home/front_door", "open");
    h.settle().await;
    assert_eq!(h.count(ARRIVE), 1);

    // repeated state is not a change
    h.send("home/front_door", "open");
    assert_eq!(h.count(ARRIVE), 1);

    h.report("kitchen", 90);
    h.send("home/front_door", "closed");
    h.advance(31).await;
    assert_eq!(h.count(ARRIVE), 1);
    assert_eq!(h.count(DEPART), 1);
}

#[tokio::test(start_paused = true)]
async fn open_gateway_is_rechecked_periodically() {
    let mut config = config();
    config.gateway.scan_interval_secs = Some(120);
    config.gateway.scan_interval_delay_secs = Some(10);
    let mut h = harness_with(config, RecordingHardware::default());

    h.send("home/front_door", "open");
    h.settle().await;
    assert_eq!(h.count(ARRIVE), 1);
    h.advance(11).await;
    assert_eq!(h.count(ARRIVE), 2);
    h.advance(120).await;
    assert_eq!(h.count(ARRIVE), 3);

    h.send("home/front_door", "closed");
    let arrivals = h.count(ARRIVE);
    h.advance(240).await;
    assert_eq!(h.count(ARRIVE), arrivals);
}

#[tokio::test(start_paused = true)]
async fn motion_waits_for_a_quiet_period() {
    let mut h = harness();
    h.command(EngineCommand::Motion { source: "hall".into() });
    h.advance(30).await;
    h.command(EngineCommand::Motion { source: "hall".into() });
    h.advance(59).await;
    assert_eq!(h.count(RSSI), 0);

    h.advance(2).await;
    assert_eq!(h.count(RSSI), 1);
}

#[tokio::test(start_paused = true)]
async fn without_gateways_scans_run_on_a_fixed_interval() {
    let mut h = harness_with(Config::default(), RecordingHardware::default());
    h.advance(2).await;
    assert_eq!(h.count(ARRIVE), 1);
    h.advance(59).await;
    assert_eq!(h.count(ARRIVE), 2);
    assert_eq!(h.count(DEPART), 1);
}

#[tokio::test(start_paused = true)]
async fn known_devices_are_announced_three_seconds_apart() {
    let mut config = config();
    config.known_devices = vec!["AA:BB phone".into(), "CC:DD watch".into()];
    let mut h = harness_with(config, RecordingHardware::default());

    let setup = "monitor/setup/ADD STATIC DEVICE";
    assert_eq!(h.count(setup), 1);
    h.advance(2).await;
    assert_eq!(h.count(setup), 1);
    h.advance(1).await;
    assert_eq!(h.count(setup), 2);
    assert_eq!(h.bus.published_to(setup)[1].payload, "CC:DD watch");

    h.advance(2).await;
    assert_eq!(h.count("monitor/KNOWN DEVICE STATES"), 1);
}

#[tokio::test(start_paused = true)]
async fn removing_a_known_device_drops_its_state() {
    let mut h = harness();
    h.report("kitchen", 90);
    h.command(EngineCommand::RemoveKnownDevice { device: "AA:BB".into() });

    assert_eq!(h.bus.published_to("monitor/setup/DELETE STATIC DEVICE")[0].payload, "AA:BB");
    assert!(h.state(PHONE).is_none());
    assert!(h.state("sensor.monitor_aa_bb_kitchen_conf").is_none());
    assert_eq!(h.state("binary_sensor.somebody_is_home").as_deref(), Some("off"));
}

#[tokio::test(start_paused = true)]
async fn strongest_signal_names_the_nearest_scanner() {
    let mut h = harness();
    h.report("kitchen", 90);
    h.report("garage", 90);
    h.send("monitor/kitchen/AA:BB/rssi", "-70");
    h.send("monitor/garage/AA:BB/rssi", "-50");
    assert_eq!(h.attribute(PHONE, "nearest_monitor"), Some(json!("Garage")));

    h.send("monitor/garage/AA:BB/rssi", "-90");
    assert_eq!(h.attribute(PHONE, "nearest_monitor"), Some(json!("Kitchen")));
}

#[tokio::test(start_paused = true)]
async fn restart_without_location_restarts_scripts() {
    let mut h = harness();
    h.command(EngineCommand::RestartDevice { location: None });
    assert_eq!(h.count("monitor/scan/restart"), 1);
}

#[tokio::test(start_paused = true)]
async fn reboots_resolve_node_lists_and_record_the_time() {
    let mut h = harness_with(config(), RecordingHardware::with_nodes(&["garage", "attic"], false));
    h.send("monitor/garage/status", "online");
    h.command(EngineCommand::RestartDevice { location: Some("Garage, cellar".into()) });
    h.settle().await;
    assert_eq!(h.hardware.calls(), vec![("garage".to_string(), "reboot".to_string())]);
    assert!(h.attribute("monitor.garage_state", "last_rebooted").is_some());

    h.command(EngineCommand::RestartDevice { location: Some("all".into()) });
    h.settle().await;
    assert_eq!(h.hardware.calls().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn rebooting_an_unseen_node_leaves_the_monitor_state_alone() {
    let mut h = harness_with(config(), RecordingHardware::with_nodes(&["attic"], false));
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let _mirror = spawn_state_mirror(
        h.store.clone(),
        h.bus.clone(),
        h.engine.names().clone(),
        h.engine.topics().clone(),
        shutdown_rx,
    );
    h.settle().await;
    let before = h.count("monitor/state");

    h.command(EngineCommand::RestartDevice { location: Some("attic".into()) });
    h.settle().await;

    assert_eq!(h.hardware.calls(), vec![("attic".to_string(), "reboot".to_string())]);
    assert!(h.state("monitor.attic_state").is_none());
    assert_eq!(h.count("monitor/state"), before);
    assert_eq!(h.count("monitor/attic/state"), 0);
}

#[tokio::test(start_paused = true)]
async fn a_busy_node_rejects_overlapping_jobs() {
    let mut h = harness_with(config(), RecordingHardware::with_nodes(&["garage"], false));
    h.command(EngineCommand::RunNodeCommand { location: "garage".into(), cmd: "uptime".into() });
    h.command(EngineCommand::RestartDevice { location: Some("garage".into()) });
    h.settle().await;
    assert_eq!(h.hardware.calls(), vec![("garage".to_string(), "uptime".to_string())]);

    h.command(EngineCommand::RestartDevice { location: Some("garage".into()) });
    h.settle().await;
    assert_eq!(h.hardware.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn offline_nodes_are_rebooted_unless_they_recover() {
    let mut h = harness_with(config(), RecordingHardware::with_nodes(&["garage", "attic"], true));
    h.send("monitor/garage/status", "online");
    h.send("monitor/attic/status", "online");
    h.send("monitor/garage/status", "offline");
    h.send("monitor/attic/status", "offline");
    assert_eq!(h.attribute("monitor.garage_state", "reboot_scheduled"), Some(json!("on")));

    h.advance(30).await;
    h.send("monitor/attic/status", "online");
    assert_eq!(h.attribute("monitor.attic_state", "reboot_scheduled"), Some(json!("off")));

    h.advance(31).await;
    assert_eq!(h.hardware.calls(), vec![("garage".to_string(), "reboot".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn offline_nodes_wait_for_their_reboot_time_of_day() {
    let target = Local::now() + chrono::Duration::hours(2);
    let hardware = RecordingHardware::with_nodes(&["garage"], true).rebooting_at(target.time());
    let mut h = harness_with(config(), hardware);
    h.send("monitor/garage/status", "online");
    h.send("monitor/garage/status", "offline");
    assert_eq!(h.attribute("monitor.garage_state", "reboot_scheduled"), Some(json!("on")));

    let reboot_time = h.attribute("monitor.garage_state", "reboot_time").unwrap();
    let reboot_time = DateTime::parse_from_rfc3339(reboot_time.as_str().unwrap()).unwrap();
    let lead = reboot_time.signed_duration_since(Local::now());
    assert!(lead > chrono::Duration::minutes(115) && lead <= chrono::Duration::minutes(120));

    // the system timeout no longer applies
    h.advance(61).await;
    assert!(h.hardware.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stale_locations_are_swept() {
    let mut h = harness();
    h.report("garage", 90);
    h.report("kitchen", 90);
    h.command(EngineCommand::ClearLocation { location: "Garage".into() });
    assert_eq!(h.state("sensor.monitor_aa_bb_garage_conf").as_deref(), Some("unknown"));

    h.advance(91).await;
    assert!(h.state("sensor.monitor_aa_bb_garage_conf").is_none());
    assert_eq!(h.state("sensor.monitor_aa_bb_kitchen_conf").as_deref(), Some("90"));
    assert_eq!(h.state(PHONE).as_deref(), Some("on"));
}

#[tokio::test(start_paused = true)]
async fn signal_for_a_known_device_without_readings_requests_an_arrive_scan() {
    let mut config = config();
    config.known_devices = vec!["AA:BB phone".into()];
    let mut h = harness_with(config, RecordingHardware::default());

    h.send("monitor/kitchen/AA:BB/rssi", "-60");
    assert_eq!(h.count(ARRIVE), 1);
    assert!(h.state(PHONE).is_none());

    let published = h.bus.published().len();
    h.send("monitor/kitchen/CC:DD/rssi", "-60");
    assert_eq!(h.bus.published().len(), published);
    assert_eq!(h.count(ARRIVE), 1);
}

#[tokio::test(start_paused = true)]
async fn rejected_messages_change_nothing() {
    let mut h = harness();
    h.send("monitor/kitchen/11:22", r#"{"type":"IBEACON","confidence":90,"id":"11:22"}"#);
    h.send("monitor/kitchen/AA:BB", "garbage");
    assert!(h.state("binary_sensor.monitor_11_22").is_none());
    assert!(h.state(PHONE).is_none());
    assert_eq!(h.count(RSSI), 0);
}

#[tokio::test]
async fn run_loop_processes_bus_traffic_and_commands() {
    let bus = Arc::new(MemoryBus::default());
    let store = Arc::new(MemoryEntityStore::new());
    let engine = Engine::new(
        &config(),
        bus.clone(),
        store.clone(),
        Arc::new(RecordingHardware::default()),
    )
    .unwrap();
    let handle = engine.handle();
    let mut verdicts = handle.events().subscribe_verdicts();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let task = tokio::spawn(engine.run(shutdown_rx));

    while bus.subscriptions().len() < 2 {
        yield_now().await;
    }
    bus.inject("monitor/kitchen/AA:BB", r#"{"type":"KNOWN_MAC","confidence":95}"#);
    let (device, verdict) = verdicts.recv().await.unwrap();
    assert_eq!(device.as_str(), "aa_bb");
    assert_eq!(verdict, crate::presence::Verdict::Home);

    handle.send(EngineCommand::RunDepartScan { delay: Some(Duration::ZERO) }).await.unwrap();
    for _ in 0..200 {
        if !bus.published_to(DEPART).is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(bus.published_to(DEPART).len(), 1);
    assert_eq!(store.state_of(PHONE).as_deref(), Some("on"));

    shutdown_tx.send(()).unwrap();
    task.await.unwrap().unwrap();
    assert!(matches!(
        handle.send(EngineCommand::RunRssiScan).await,
        Err(PresenceError::EngineStopped)
    ));
}
