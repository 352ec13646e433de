// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/monitor-presence-rs

//! Protocol module - inbound classification and outbound topics

mod payload;
mod router;
mod topics;

pub use payload::{parse_confidence, parse_gateway_state, parse_signal_strength, ConfidencePayload};
pub use router::MessageRouter;
pub use topics::Topics;

use crate::health::Liveness;
use crate::presence::{DeviceKey, Reading};
use crate::scanning::ScanKind;

/// Actions the monitors publish that carry nothing for the engine,
/// including the engine's own outbound traffic seen on the wildcard.
pub const IGNORED_ACTIONS: &[&str] = &[
    "depart",
    "arrive",
    "state",
    "known device states",
    "add static device",
    "delete static device",
];

/// A classified inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Status { location: String, liveness: Liveness },
    ScanStarted { location: String, scan_type: String },
    ScanEnded { location: String, scan_type: String },
    Echo { location: String, ok: bool },
    SignalStrength { device: DeviceKey, location: String, strength: i32 },
    /// The whole monitor system announced a restart
    Restart,
    Reboot { location: String },
    RunScan(ScanKind),
    Confidence(Reading),
    Gateway { source: String, open: bool },
    Motion { source: String },
    Ignored(&'static str),
}
