// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/monitor-presence-rs

//! Configuration module

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::bus::MqttConfig;
use crate::error::ConfigError;
use crate::hardware::RemoteMonitor;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application name
    pub app_name: String,

    /// Application version
    pub version: String,

    /// Log level
    pub log_level: String,

    /// Run against the in-memory bus with simulated scanners
    pub demo_mode: bool,

    /// Devices pushed to every monitor, as `"<mac> <name>"`
    pub known_devices: Vec<String>,

    /// Beacons accepted besides known MACs, as `"<id> <name>"`
    pub known_beacons: Vec<String>,

    /// Broker connection
    pub mqtt: MqttConfig,

    /// Presence reconciliation tuning
    pub presence: PresenceConfig,

    /// Door/lock sensors that trigger scans
    pub gateway: GatewayConfig,

    /// Motion sensors that trigger RSSI refreshes
    pub motion: MotionConfig,

    /// Monitor nodes reachable for hardware reboot, keyed by location
    pub remote_monitors: BTreeMap<String, RemoteMonitor>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "monitor-presence".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info".to_string(),
            demo_mode: false,
            known_devices: Vec::new(),
            known_beacons: Vec::new(),
            mqtt: MqttConfig::default(),
            presence: PresenceConfig::default(),
            gateway: GatewayConfig::default(),
            motion: MotionConfig::default(),
            remote_monitors: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            details: e.to_string(),
        })?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("monitor-presence"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Non-fatal problems worth a startup warning.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !self.presence.health_checks_enabled() {
            warnings.push(format!(
                "system_timeout ({}s) must exceed system_check ({}s); scanner health checks disabled",
                self.presence.system_timeout_secs, self.presence.system_check_secs
            ));
        }
        if self.presence.minimum_confidence > 100 {
            warnings.push(format!(
                "minimum_confidence {} is above 100; no device can ever be home",
                self.presence.minimum_confidence
            ));
        }
        if self.gateway.topics.is_empty() {
            warnings.push(format!(
                "no gateway topics configured; arrive and depart scans will run every {}s",
                self.gateway.fallback_scan_interval_secs
            ));
        }
        if let Err(e) = self.known_beacon_map() {
            warnings.push(e.to_string());
        }
        if let Err(e) = parse_pairs(&self.known_devices, "known_devices") {
            warnings.push(e.to_string());
        }

        warnings
    }

    /// Allow-listed beacon ids (lowercased) mapped to their friendly name.
    pub fn known_beacon_map(&self) -> Result<HashMap<String, String>, ConfigError> {
        Ok(parse_pairs(&self.known_beacons, "known_beacons")?
            .into_iter()
            .map(|(id, name)| (id.to_lowercase(), name.to_lowercase()))
            .collect())
    }
}

/// Split `"<id> <name>"` entries on the first whitespace.
pub fn parse_pairs(
    entries: &[String],
    field: &'static str,
) -> Result<Vec<(String, String)>, ConfigError> {
    entries
        .iter()
        .map(|entry| {
            let trimmed = entry.trim();
            match trimmed.split_once(char::is_whitespace) {
                Some((id, name)) if !name.trim().is_empty() => {
                    Ok((id.to_string(), name.trim().to_string()))
                }
                _ => Err(ConfigError::BadDeviceEntry {
                    field,
                    entry: entry.clone(),
                }),
            }
        })
        .collect()
}

/// Presence reconciliation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Root topic the monitor scripts publish under, may be nested
    pub monitor_topic: String,

    /// Minimum confidence (0-100) for a reading to count as home
    pub minimum_confidence: u8,

    /// Debounce before committing away
    pub not_home_timeout_secs: u64,

    /// Delay before a departure scan is sent
    pub depart_check_time_secs: u64,

    /// Follow-up departure scans after the first
    pub depart_scans: u32,

    /// Retry delay when a departure scan finds the scanners busy
    pub depart_busy_backoff_secs: u64,

    /// Quiet period after motion before an RSSI scan
    pub rssi_timeout_secs: u64,

    /// Silence after which a scanner's readings are cleared
    pub system_timeout_secs: u64,

    /// Echo probe interval
    pub system_check_secs: u64,

    /// Interval for sweeping data of locations no longer reporting
    pub location_clean_interval_secs: u64,

    /// Domain used for per-device presence entities
    pub user_device_domain: DeviceDomain,

    /// Entity object id of the "everyone home" sensor
    pub everyone_home: String,

    /// Entity object id of the "everyone not home" sensor
    pub everyone_not_home: String,

    /// Entity object id of the "somebody is home" sensor
    pub somebody_is_home: String,

    /// What happens after an offline scanner's readings are cleared
    pub offline_policy: OfflinePolicy,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            monitor_topic: "monitor".to_string(),
            minimum_confidence: 50,
            not_home_timeout_secs: 30,
            depart_check_time_secs: 30,
            depart_scans: 3,
            depart_busy_backoff_secs: 10,
            rssi_timeout_secs: 60,
            system_timeout_secs: 60,
            system_check_secs: 30,
            location_clean_interval_secs: 3600,
            user_device_domain: DeviceDomain::BinarySensor,
            everyone_home: "everyone_home".to_string(),
            everyone_not_home: "everyone_not_home".to_string(),
            somebody_is_home: "somebody_is_home".to_string(),
            offline_policy: OfflinePolicy::ClearOnly,
        }
    }
}

impl PresenceConfig {
    pub fn not_home_timeout(&self) -> Duration {
        Duration::from_secs(self.not_home_timeout_secs)
    }

    pub fn depart_check_time(&self) -> Duration {
        Duration::from_secs(self.depart_check_time_secs)
    }

    pub fn depart_busy_backoff(&self) -> Duration {
        Duration::from_secs(self.depart_busy_backoff_secs)
    }

    pub fn rssi_timeout(&self) -> Duration {
        Duration::from_secs(self.rssi_timeout_secs)
    }

    pub fn system_timeout(&self) -> Duration {
        Duration::from_secs(self.system_timeout_secs)
    }

    pub fn system_check(&self) -> Duration {
        Duration::from_secs(self.system_check_secs)
    }

    pub fn location_clean_interval(&self) -> Duration {
        Duration::from_secs(self.location_clean_interval_secs)
    }

    /// Liveness cannot be established faster than it is probed.
    pub fn health_checks_enabled(&self) -> bool {
        self.system_timeout_secs > self.system_check_secs
    }

    /// Last segment of the monitor topic, used as the entity prefix.
    pub fn root_name(&self) -> &str {
        self.monitor_topic
            .rsplit('/')
            .next()
            .unwrap_or(&self.monitor_topic)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeviceDomain {
    BinarySensor,
    DeviceTracker,
}

impl DeviceDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceDomain::BinarySensor => "binary_sensor",
            DeviceDomain::DeviceTracker => "device_tracker",
        }
    }

    pub fn home_state(&self) -> &'static str {
        match self {
            DeviceDomain::BinarySensor => "on",
            DeviceDomain::DeviceTracker => "home",
        }
    }

    pub fn away_state(&self) -> &'static str {
        match self {
            DeviceDomain::BinarySensor => "off",
            DeviceDomain::DeviceTracker => "not_home",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OfflinePolicy {
    /// Drop the location's readings and let each device's debounce decide
    ClearOnly,
    /// Additionally request an arrival scan from the remaining scanners
    ClearAndRescan,
}

/// Gateway (door, lock) sensor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Topics carrying gateway open/closed states
    pub topics: Vec<String>,

    /// Re-run the scan check this often while a gateway stays open
    pub scan_interval_secs: Option<u64>,

    /// First re-check delay after a gateway opens
    pub scan_interval_delay_secs: Option<u64>,

    /// Periodic arrive/depart scans when no gateway topics exist
    pub fallback_scan_interval_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            topics: Vec::new(),
            scan_interval_secs: None,
            scan_interval_delay_secs: None,
            fallback_scan_interval_secs: 60,
        }
    }
}

/// Motion sensor configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Topics carrying motion sensor events
    pub topics: Vec<String>,
}
