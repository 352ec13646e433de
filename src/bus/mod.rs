// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/monitor-presence-rs

//! Bus module - publish/subscribe transport
//!
//! The engine only needs two operations: a publish that never waits on
//! the network, and a subscription that yields `(topic, payload)` pairs.

mod memory;
mod mqtt;

pub use memory::MemoryBus;
pub use mqtt::{MqttBus, MqttConfig};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast;
use tracing::warn;

use crate::error::BusError;

/// A message as seen on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

impl BusMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            retain: false,
        }
    }

    pub fn retained(mut self) -> Self {
        self.retain = true;
        self
    }
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Queue a message for delivery. Must not block on the network.
    fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<(), BusError>;

    /// Subscribe to an MQTT-style pattern (`+` and `#` wildcards).
    async fn subscribe(&self, pattern: &str) -> Result<BoxStream<'static, BusMessage>, BusError>;
}

/// MQTT topic filter matching
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    let mut filter = pattern.split('/');
    let mut levels = topic.split('/');
    loop {
        match (filter.next(), levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Turn a broadcast feed into a stream of the messages matching `pattern`.
pub(crate) fn filtered_stream(
    rx: broadcast::Receiver<BusMessage>,
    pattern: &str,
) -> BoxStream<'static, BusMessage> {
    stream::unfold((rx, pattern.to_string()), |(mut rx, pattern)| async move {
        loop {
            match rx.recv().await {
                Ok(msg) if topic_matches(&pattern, &msg.topic) => return Some((msg, (rx, pattern))),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(pattern = %pattern, missed, "Subscriber lagged, messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}
