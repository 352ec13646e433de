// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/monitor-presence-rs

//! Error taxonomy
//!
//! None of these are fatal to the engine. Protocol errors are dropped at
//! debug level, transport errors are logged and left to the bus client's
//! reconnect loop, hardware errors clear the node's busy flag and are
//! surfaced to the operator through the log only.

use thiserror::Error;

/// Inbound message could not be classified or parsed
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("topic {0:?} is outside the monitor root")]
    ForeignTopic(String),

    #[error("no location could be derived from topic {0:?}")]
    MissingLocation(String),

    #[error("no device segment in topic {0:?}")]
    MissingDevice(String),

    #[error("payload is not a JSON object: {0}")]
    MalformedJson(String),

    #[error("unsupported device type {kind:?} for id {id:?}")]
    UnknownBeacon { kind: String, id: Option<String> },

    #[error("confidence value {0:?} is not numeric")]
    BadConfidence(String),

    #[error("signal strength {0:?} is not numeric")]
    BadSignalStrength(String),

    #[error("unknown scan request {0:?}")]
    UnknownScan(String),

    #[error("unknown scanner status {0:?}")]
    UnknownStatus(String),
}

/// Publish/subscribe failure reported by the bus adapter
#[derive(Debug, Error)]
pub enum BusError {
    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("subscribe to {pattern} failed: {reason}")]
    Subscribe { pattern: String, reason: String },

    #[error("bus connection closed")]
    Closed,
}

/// Remote node command failure
#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("node {0} has no configured credentials")]
    UnknownNode(String),

    #[error("node {node} is busy executing a previous command")]
    Busy { node: String },

    #[error("failed to launch command on {node}: {source}")]
    Spawn {
        node: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command on {node} exited with {status}: {stderr}")]
    CommandFailed {
        node: String,
        status: String,
        stderr: String,
    },
}

/// Configuration is unusable
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {details}")]
    Parse { path: String, details: String },

    #[error("invalid entry {entry:?} in {field}: expected \"<id> <name>\"")]
    BadDeviceEntry { field: &'static str, entry: String },
}

/// Umbrella error for library callers
#[derive(Debug, Error)]
pub enum PresenceError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] BusError),

    #[error(transparent)]
    ExternalAction(#[from] HardwareError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("engine has shut down")]
    EngineStopped,
}

pub type Result<T, E = PresenceError> = std::result::Result<T, E>;
