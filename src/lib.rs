// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/monitor-presence-rs

//! Monitor Presence - Presence Reconciliation Engine
//!
//! Turns the MQTT traffic of a fleet of Bluetooth "monitor" scanners into
//! home/away verdicts:
//! - Per-device confidence aggregation across every scanner location
//! - Debounced departures and confident arrivals
//! - Household aggregates (everyone home, everyone away, somebody home)
//! - Coordinated arrive/depart/RSSI scans triggered by doors and motion
//! - Scanner liveness with offline cleanup and optional node reboot
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Presence Engine                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────┐  ┌──────────┐  ┌───────────┐  ┌────────────┐  │
//! │  │ Message │→ │ Presence │→ │ Household │→ │  Entity    │  │
//! │  │ Router  │  │ Verdicts │  │ Aggregate │  │  Store     │  │
//! │  └─────────┘  └──────────┘  └───────────┘  └────────────┘  │
//! │       ↓            ↓             ↓              ↓          │
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │            Scheduler  /  Event Bus                   │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! │       ↓            ↓             ↓              ↓          │
//! │  ┌─────────┐  ┌──────────┐  ┌───────────┐  ┌────────────┐  │
//! │  │  MQTT   │  │   Scan   │  │  Health   │  │  Hardware  │  │
//! │  │  Bus    │  │  Coord.  │  │  Monitor  │  │  (SSH)     │  │
//! │  └─────────┘  └──────────┘  └───────────┘  └────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![allow(dead_code)]

pub mod bus;
pub mod config;
pub mod core;
pub mod entities;
pub mod error;
pub mod hardware;
pub mod health;
pub mod presence;
pub mod protocol;
pub mod scanning;
pub mod simulator;

// Re-exports for convenience
pub use bus::{MemoryBus, MessageBus, MqttBus};
pub use config::Config;
pub use core::{Engine, EngineCommand, EngineHandle, Event, EventBus};
pub use entities::{EntityStore, MemoryEntityStore};
pub use error::{PresenceError, Result};
pub use hardware::{HardwareControl, SshHardwareControl};
pub use simulator::MonitorSimulator;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = "monitor-presence";

/// Build info
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: VERSION.to_string(),
        rust_version: env!("CARGO_PKG_RUST_VERSION").to_string(),
        target: std::env::consts::ARCH.to_string(),
        os: std::env::consts::OS.to_string(),
    }
}

/// Build information
#[derive(Debug, Clone)]
pub struct BuildInfo {
    /// Version string
    pub version: String,
    /// Minimum supported Rust version
    pub rust_version: String,
    /// Target architecture
    pub target: String,
    /// Operating system
    pub os: String,
}
