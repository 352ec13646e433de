// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/monitor-presence-rs

//! Mirrors the monitor and node entities onto the bus as retained JSON

use std::sync::Arc;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{EntityChange, EntityNames, EntityStore};
use crate::bus::{BusMessage, MessageBus};
use crate::presence::normalize_location;
use crate::protocol::Topics;

/// Bus message for a monitor/node entity change, `None` for every other
/// entity and for removals.
pub fn mirror_message(change: &EntityChange, names: &EntityNames, topics: &Topics) -> Option<BusMessage> {
    let is_system = change.entity_id.starts_with(&names.system_prefix())
        && change.entity_id.ends_with("_state");
    if !is_system {
        return None;
    }
    let entity = change.new.as_ref()?;

    let mut data = entity.attributes.clone();
    data.remove("friendly_name");
    data.insert("last_changed".into(), Value::String(entity.last_changed.to_rfc3339()));
    data.insert("state".into(), Value::String(entity.state.clone()));

    let topic = match data.get("location").and_then(Value::as_str) {
        Some(location) => topics.node_state(&normalize_location(location)),
        None => topics.monitor_state(),
    };

    let payload = Value::Object(data).to_string();
    Some(BusMessage::new(topic, payload).retained())
}

/// Forward entity changes until shutdown.
pub fn spawn_state_mirror(
    store: Arc<dyn EntityStore>,
    bus: Arc<dyn MessageBus>,
    names: EntityNames,
    topics: Topics,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    let mut changes = store.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                change = changes.recv() => match change {
                    Ok(change) => {
                        if let Some(msg) = mirror_message(&change, &names, &topics) {
                            if let Err(e) = bus.publish(&msg.topic, &msg.payload, msg.retain) {
                                warn!("State mirror publish failed: {}", e);
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "State mirror lagged behind entity changes");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = shutdown.recv() => break,
            }
        }
        debug!("State mirror stopped");
    })
}
