// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/monitor-presence-rs

//! Message router
//!
//! Topic grammar under the monitor root (which may itself be nested):
//!
//! ```text
//! <root>/<location>/<device>            confidence report (JSON)
//! <root>/<location>/<device>/rssi       signal strength sample
//! <root>/<location>/<scan_type>/start   scan cycle bookkeeping
//! <root>/<location>/status              online / offline
//! <root>/<location>/echo                reply to the echo probe
//! <root>/<location>/reboot              hardware reboot request
//! <root>/run_scan                       arrive | depart | rssi
//! ```
//!
//! A JSON payload carrying `identity` names the location regardless of
//! where it sits in the topic.

use std::collections::HashMap;
use chrono::Utc;
use serde_json::Value;

use super::payload::{parse_confidence, parse_gateway_state, parse_signal_text, ConfidencePayload};
use super::{Inbound, IGNORED_ACTIONS};
use crate::config::Config;
use crate::error::{ConfigError, ProtocolError};
use crate::health::Liveness;
use crate::presence::{normalize_location, title_case, Device, DeviceClass, DeviceKey, Reading};
use crate::scanning::ScanKind;

#[derive(Debug, Clone)]
pub struct MessageRouter {
    root: String,
    depth: usize,
    known_beacons: HashMap<String, String>,
    gateway_topics: Vec<String>,
    motion_topics: Vec<String>,
}

impl MessageRouter {
    pub fn new(monitor_topic: &str, known_beacons: HashMap<String, String>) -> Self {
        let root = monitor_topic.trim_end_matches('/').to_string();
        let depth = root.split('/').count();
        Self {
            root,
            depth,
            known_beacons,
            gateway_topics: Vec::new(),
            motion_topics: Vec::new(),
        }
    }

    pub fn with_gateways(mut self, topics: Vec<String>) -> Self {
        self.gateway_topics = topics;
        self
    }

    pub fn with_motion(mut self, topics: Vec<String>) -> Self {
        self.motion_topics = topics;
        self
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self::new(&config.presence.monitor_topic, config.known_beacon_map()?)
            .with_gateways(config.gateway.topics.clone())
            .with_motion(config.motion.topics.clone()))
    }

    /// Every pattern the engine must subscribe to
    pub fn subscriptions(&self) -> Vec<String> {
        let mut patterns = vec![format!("{}/#", self.root)];
        patterns.extend(self.gateway_topics.iter().cloned());
        patterns.extend(self.motion_topics.iter().cloned());
        patterns
    }

    pub fn known_beacons(&self) -> &HashMap<String, String> {
        &self.known_beacons
    }

    pub fn route(&self, topic: &str, payload: &str) -> Result<Inbound, ProtocolError> {
        if self.gateway_topics.iter().any(|t| t == topic) {
            return Ok(match parse_gateway_state(payload) {
                Some(open) => Inbound::Gateway { source: topic.to_string(), open },
                None => Inbound::Ignored("unrecognized gateway state"),
            });
        }
        if self.motion_topics.iter().any(|t| t == topic) {
            return Ok(Inbound::Motion { source: topic.to_string() });
        }

        let prefix = format!("{}/", self.root);
        if !topic.starts_with(&prefix) {
            return Err(ProtocolError::ForeignTopic(topic.to_string()));
        }

        let segments: Vec<&str> = topic.split('/').collect();
        let action = segments.last().map(|s| s.to_lowercase()).unwrap_or_default();
        let json: Option<Value> = serde_json::from_str(payload).ok();

        if action == "run_scan" {
            return payload.parse::<ScanKind>().map(Inbound::RunScan);
        }

        let location = self.location_of(&segments, json.as_ref());
        let Some(location) = location else {
            if action == "echo" || IGNORED_ACTIONS.contains(&action.as_str()) {
                return Ok(Inbound::Ignored("own traffic"));
            }
            return Err(ProtocolError::MissingLocation(topic.to_string()));
        };

        match action.as_str() {
            "restart" => return Ok(Inbound::Restart),
            a if IGNORED_ACTIONS.contains(&a) => return Ok(Inbound::Ignored("house-keeping action")),
            "status" => {
                let liveness = Liveness::parse(payload)?;
                return Ok(Inbound::Status { location, liveness });
            }
            "start" | "end" => {
                let scan_type = segments
                    .get(self.depth + 1)
                    .map(|s| s.to_lowercase())
                    .unwrap_or_default();
                return Ok(if action == "start" {
                    Inbound::ScanStarted { location, scan_type }
                } else {
                    Inbound::ScanEnded { location, scan_type }
                });
            }
            "echo" => {
                return Ok(Inbound::Echo {
                    location,
                    ok: payload.trim().eq_ignore_ascii_case("ok"),
                })
            }
            "reboot" => return Ok(Inbound::Reboot { location }),
            _ => {}
        }

        let raw_id = segments
            .get(self.depth + 1)
            .copied()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ProtocolError::MissingDevice(topic.to_string()))?;
        let key = DeviceKey::from_topic_id(raw_id, &self.known_beacons);

        if action == "rssi" {
            if topic == format!("{}/scan/rssi", self.root) || payload.trim().is_empty() {
                return Ok(Inbound::Ignored("rssi request echo"));
            }
            let strength = parse_signal_text(payload)
                .ok_or_else(|| ProtocolError::BadSignalStrength(payload.to_string()))?;
            return Ok(Inbound::SignalStrength { device: key, location, strength });
        }

        let json = match json {
            Some(value @ Value::Object(_)) => value,
            _ => return Err(ProtocolError::MalformedJson(payload.to_string())),
        };
        let body: ConfidencePayload = serde_json::from_value(json)
            .map_err(|e| ProtocolError::MalformedJson(e.to_string()))?;

        let class = self.classify(&body)?;
        let confidence = match &body.confidence {
            Some(value) => parse_confidence(value)?,
            None => 0,
        };
        let signal_strength = body.rssi.as_ref().and_then(super::parse_signal_strength);

        let mut device = Device::new(key, class).with_id(body.id.clone().unwrap_or_else(|| raw_id.to_string()));
        if let Some(name) = body.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            device = device.with_name(title_case(name));
        }

        Ok(Inbound::Confidence(Reading {
            device,
            location,
            confidence,
            signal_strength,
            reported_at: Utc::now(),
        }))
    }

    fn location_of(&self, segments: &[&str], json: Option<&Value>) -> Option<String> {
        let from_payload = json
            .and_then(|v| v.get("identity"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let raw = from_payload.or_else(|| {
            if segments.len() > self.depth + 1 {
                segments.get(self.depth).map(|s| s.to_string())
            } else {
                None
            }
        })?;
        match raw.trim() {
            "" | "None" => None,
            loc => Some(normalize_location(loc)),
        }
    }

    /// Known device types pass; anything else only if its id is an
    /// allow-listed beacon.
    fn classify(&self, body: &ConfidencePayload) -> Result<DeviceClass, ProtocolError> {
        match body.kind.as_deref() {
            Some("KNOWN_MAC") => Ok(DeviceClass::KnownMac),
            Some("GENERIC_BEACON") => Ok(DeviceClass::GenericBeacon),
            other => {
                let allowed = body
                    .id
                    .as_deref()
                    .map(|id| self.known_beacons.contains_key(&id.to_lowercase()))
                    .unwrap_or(false);
                if allowed {
                    Ok(DeviceClass::GenericBeacon)
                } else {
                    Err(ProtocolError::UnknownBeacon {
                        kind: other.unwrap_or("").to_string(),
                        id: body.id.clone(),
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> MessageRouter {
        let mut beacons = HashMap::new();
        beacons.insert("e2c56db5-dffb-48d2".to_string(), "car keys".to_string());
        MessageRouter::new("monitor", beacons)
            .with_gateways(vec!["home/front_door".to_string()])
            .with_motion(vec!["home/hall_motion".to_string()])
    }

    #[test]
    fn confidence_report_is_parsed() {
        let inbound = router()
            .route(
                "monitor/Living Room/AA:BB:CC:DD:EE:FF",
                r#"{"type":"KNOWN_MAC","confidence":"87.5","name":" john's phone ","rssi":"-61"}"#,
            )
            .unwrap();
        let Inbound::Confidence(reading) = inbound else {
            panic!("expected a confidence reading");
        };
        assert_eq!(reading.location, "living_room");
        assert_eq!(reading.device.key.as_str(), "aa_bb_cc_dd_ee_ff");
        assert_eq!(reading.device.id.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        assert_eq!(reading.device.name.as_deref(), Some("John's Phone"));
        assert_eq!(reading.confidence, 87);
        assert_eq!(reading.signal_strength, Some(-61));
    }

    #[test]
    fn identity_overrides_topic_location() {
        let inbound = router()
            .route(
                "monitor/kitchen/aa:bb",
                r#"{"type":"KNOWN_MAC","confidence":50,"identity":"Garage"}"#,
            )
            .unwrap();
        assert!(matches!(inbound, Inbound::Confidence(r) if r.location == "garage"));
    }

    #[test]
    fn nested_root_shifts_segments() {
        let router = MessageRouter::new("hass/monitor", HashMap::new());
        assert_eq!(
            router.route("hass/monitor/garage/status", "OFFLINE").unwrap(),
            Inbound::Status { location: "garage".into(), liveness: Liveness::Offline }
        );
    }

    #[test]
    fn unknown_beacons_are_rejected_and_known_ones_accepted() {
        let r = router();
        let err = r
            .route("monitor/kitchen/1234-5678", r#"{"type":"IBEACON","confidence":90,"id":"1234-5678"}"#)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownBeacon { .. }));

        let ok = r
            .route(
                "monitor/kitchen/E2C56DB5-DFFB-48D2",
                r#"{"type":"IBEACON","confidence":90,"id":"E2C56DB5-DFFB-48D2"}"#,
            )
            .unwrap();
        assert!(matches!(ok, Inbound::Confidence(r) if r.device.key.as_str() == "car_keys"
            && r.device.class == DeviceClass::GenericBeacon));
    }

    #[test]
    fn numeric_beacon_ids_are_read_as_text() {
        let err = router()
            .route("monitor/kitchen/4021", r#"{"type":"IBEACON","confidence":90,"id":4021}"#)
            .unwrap_err();
        assert_eq!(
            err,
            ProtocolError::UnknownBeacon { kind: "IBEACON".into(), id: Some("4021".into()) }
        );

        let Inbound::Confidence(reading) = router()
            .route("monitor/kitchen/4021", r#"{"type":"GENERIC_BEACON","confidence":90,"id":4021}"#)
            .unwrap()
        else {
            panic!("expected a confidence reading");
        };
        assert_eq!(reading.device.id.as_deref(), Some("4021"));
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            router().route("monitor/kitchen/aa:bb", "not json"),
            Err(ProtocolError::MalformedJson(_))
        ));
    }

    #[test]
    fn own_traffic_is_ignored() {
        let r = router();
        assert_eq!(r.route("monitor/echo", "").unwrap(), Inbound::Ignored("own traffic"));
        assert!(matches!(r.route("monitor/scan/arrive", "").unwrap(), Inbound::Ignored(_)));
        assert!(matches!(r.route("monitor/scan/rssi", "").unwrap(), Inbound::Ignored(_)));
        assert!(matches!(r.route("monitor/KNOWN DEVICE STATES", "").unwrap(), Inbound::Ignored(_)));
        assert!(matches!(
            r.route("monitor/setup/ADD STATIC DEVICE", "aa:bb phone").unwrap(),
            Inbound::Ignored(_)
        ));
        assert!(matches!(r.route("monitor/kitchen/state", "{}").unwrap(), Inbound::Ignored(_)));
    }

    #[test]
    fn missing_location_is_reported() {
        assert!(matches!(
            router().route("monitor/status", "online"),
            Err(ProtocolError::MissingLocation(_))
        ));
    }

    #[test]
    fn scan_bookkeeping_and_echo() {
        let r = router();
        assert_eq!(
            r.route("monitor/garage/arrive/start", "").unwrap(),
            Inbound::ScanStarted { location: "garage".into(), scan_type: "arrive".into() }
        );
        assert_eq!(
            r.route("monitor/garage/arrive/end", "").unwrap(),
            Inbound::ScanEnded { location: "garage".into(), scan_type: "arrive".into() }
        );
        assert_eq!(
            r.route("monitor/garage/echo", "ok").unwrap(),
            Inbound::Echo { location: "garage".into(), ok: true }
        );
    }

    #[test]
    fn rssi_samples() {
        let r = router();
        assert_eq!(
            r.route("monitor/garage/AA:BB/rssi", "-70").unwrap(),
            Inbound::SignalStrength {
                device: DeviceKey::new("aa_bb"),
                location: "garage".into(),
                strength: -70
            }
        );
        assert!(matches!(r.route("monitor/garage/AA:BB/rssi", "").unwrap(), Inbound::Ignored(_)));
        assert!(matches!(
            r.route("monitor/garage/AA:BB/rssi", "loud"),
            Err(ProtocolError::BadSignalStrength(_))
        ));
    }

    #[test]
    fn run_scan_and_reboot() {
        let r = router();
        assert_eq!(r.route("monitor/run_scan", "Depart").unwrap(), Inbound::RunScan(ScanKind::Depart));
        assert_eq!(
            r.route("monitor/attic/reboot", "").unwrap(),
            Inbound::Reboot { location: "attic".into() }
        );
        assert_eq!(r.route("monitor/attic/restart", "").unwrap(), Inbound::Restart);
    }

    #[test]
    fn gateway_and_motion_topics() {
        let r = router();
        assert_eq!(
            r.route("home/front_door", "open").unwrap(),
            Inbound::Gateway { source: "home/front_door".into(), open: true }
        );
        assert!(matches!(r.route("home/front_door", "ajar").unwrap(), Inbound::Ignored(_)));
        assert_eq!(
            r.route("home/hall_motion", "on").unwrap(),
            Inbound::Motion { source: "home/hall_motion".into() }
        );
        assert!(matches!(r.route("elsewhere/topic", ""), Err(ProtocolError::ForeignTopic(_))));
    }
}
