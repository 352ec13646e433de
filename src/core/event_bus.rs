// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/monitor-presence-rs

//! Event bus for inter-component communication

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use crate::health::Liveness;
use crate::presence::{DeviceKey, HouseholdState, Verdict};
use crate::scanning::ScanPhase;

/// Event types in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Verdict,
    Household,
    Scanner,
    ScanState,
    Alert,
}

/// Generic event wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Verdict { device: DeviceKey, verdict: Verdict },
    Household(HouseholdState),
    Scanner { location: String, liveness: Liveness },
    ScanState(ScanPhase),
    Alert { level: String, message: String },
}

/// Central event bus for pub/sub communication
pub struct EventBus {
    verdict_tx: broadcast::Sender<(DeviceKey, Verdict)>,
    household_tx: broadcast::Sender<HouseholdState>,
    event_tx: broadcast::Sender<Event>,
    event_counter: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (verdict_tx, _) = broadcast::channel(capacity);
        let (household_tx, _) = broadcast::channel(capacity);
        let (event_tx, _) = broadcast::channel(capacity);

        Self {
            verdict_tx,
            household_tx,
            event_tx,
            event_counter: AtomicU64::new(0),
        }
    }

    pub fn publish_verdict(&self, device: &DeviceKey, verdict: Verdict) {
        let _ = self.verdict_tx.send((device.clone(), verdict));
        self.publish_event(
            EventType::Verdict,
            EventPayload::Verdict { device: device.clone(), verdict },
        );
    }

    pub fn publish_household(&self, state: HouseholdState) {
        let _ = self.household_tx.send(state.clone());
        self.publish_event(EventType::Household, EventPayload::Household(state));
    }

    pub fn publish_scanner(&self, location: &str, liveness: Liveness) {
        self.publish_event(
            EventType::Scanner,
            EventPayload::Scanner { location: location.to_string(), liveness },
        );
    }

    pub fn publish_scan_state(&self, phase: ScanPhase) {
        self.publish_event(EventType::ScanState, EventPayload::ScanState(phase));
    }

    pub fn publish_alert(&self, level: &str, message: &str) {
        self.publish_event(
            EventType::Alert,
            EventPayload::Alert {
                level: level.to_string(),
                message: message.to_string(),
            },
        );
    }

    fn publish_event(&self, event_type: EventType, payload: EventPayload) {
        let id = self.event_counter.fetch_add(1, Ordering::Relaxed);
        let event = Event {
            id,
            event_type,
            timestamp: Utc::now(),
            payload,
        };
        let _ = self.event_tx.send(event);
    }

    pub fn subscribe_verdicts(&self) -> broadcast::Receiver<(DeviceKey, Verdict)> {
        self.verdict_tx.subscribe()
    }

    pub fn subscribe_household(&self) -> broadcast::Receiver<HouseholdState> {
        self.household_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
