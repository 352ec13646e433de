// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/monitor-presence-rs

//! In-process loopback bus for demo mode and tests

use async_trait::async_trait;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::{filtered_stream, BusMessage, MessageBus};
use crate::error::BusError;

/// Every published message is recorded and delivered back to matching
/// subscribers, the way a broker would echo it.
pub struct MemoryBus {
    tx: broadcast::Sender<BusMessage>,
    published: Mutex<Vec<BusMessage>>,
    subscriptions: Mutex<Vec<String>>,
}

impl MemoryBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            published: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Deliver a message as if another client had published it.
    pub fn inject(&self, topic: &str, payload: &str) {
        let _ = self.tx.send(BusMessage::new(topic, payload));
    }

    /// Messages published through [`MessageBus::publish`] so far
    pub fn published(&self) -> Vec<BusMessage> {
        self.published.lock().clone()
    }

    pub fn published_to(&self, topic: &str) -> Vec<BusMessage> {
        self.published
            .lock()
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().clone()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<(), BusError> {
        let mut msg = BusMessage::new(topic, payload);
        msg.retain = retain;
        self.published.lock().push(msg.clone());
        let _ = self.tx.send(msg);
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<BoxStream<'static, BusMessage>, BusError> {
        self.subscriptions.lock().push(pattern.to_string());
        Ok(filtered_stream(self.tx.subscribe(), pattern))
    }
}
