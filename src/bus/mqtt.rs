// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/monitor-presence-rs

//! MQTT transport

use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{filtered_stream, BusMessage, MessageBus};
use crate::error::BusError;

/// Broker connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub broker: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
    pub reconnect_interval_ms: u64,
    /// Requests buffered between the client and its event loop
    pub capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: "localhost".to_string(),
            port: 1883,
            client_id: "monitor-presence".to_string(),
            username: None,
            password: None,
            keep_alive_secs: 30,
            reconnect_interval_ms: 5000,
            capacity: 100,
        }
    }
}

/// MQTT client wrapper
///
/// The rumqttc event loop runs on its own task. It reconnects on error
/// and re-issues every subscription after each ConnAck, so callers never
/// see a reconnect.
pub struct MqttBus {
    client: AsyncClient,
    inbound: broadcast::Sender<BusMessage>,
    subscriptions: Arc<Mutex<Vec<String>>>,
}

impl MqttBus {
    pub fn connect(config: &MqttConfig) -> Self {
        let mut options = MqttOptions::new(&config.client_id, &config.broker, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        let (client, mut eventloop) = AsyncClient::new(options, config.capacity);
        let (inbound, _) = broadcast::channel(1024);
        let subscriptions: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let tx = inbound.clone();
        let resubscribe = client.clone();
        let patterns = subscriptions.clone();
        let reconnect = Duration::from_millis(config.reconnect_interval_ms);

        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("MQTT connected");
                        let current = patterns.lock().clone();
                        for pattern in current {
                            if let Err(e) = resubscribe.try_subscribe(pattern.as_str(), QoS::AtLeastOnce) {
                                warn!("MQTT resubscribe to {} failed: {:?}", pattern, e);
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(msg))) => {
                        debug!("MQTT received: {:?}", msg.topic);
                        let payload = String::from_utf8_lossy(&msg.payload).into_owned();
                        let _ = tx.send(BusMessage {
                            topic: msg.topic,
                            payload,
                            retain: msg.retain,
                        });
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("MQTT error: {:?}", e);
                        tokio::time::sleep(reconnect).await;
                    }
                }
            }
        });

        info!("MQTT client initialized for {}:{}", config.broker, config.port);

        Self {
            client,
            inbound,
            subscriptions,
        }
    }

    pub async fn disconnect(&self) -> Result<(), BusError> {
        self.client.disconnect().await.map_err(|e| {
            debug!("MQTT disconnect failed: {}", e);
            BusError::Closed
        })
    }
}

#[async_trait]
impl MessageBus for MqttBus {
    fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<(), BusError> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, retain, payload.as_bytes().to_vec())
            .map_err(|e| BusError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn subscribe(&self, pattern: &str) -> Result<BoxStream<'static, BusMessage>, BusError> {
        // Receiver first so nothing published after the SUBSCRIBE is missed.
        let rx = self.inbound.subscribe();
        self.subscriptions.lock().push(pattern.to_string());
        self.client
            .subscribe(pattern, QoS::AtLeastOnce)
            .await
            .map_err(|e| BusError::Subscribe {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;

        info!("Subscribed to MQTT topic: {}", pattern);
        Ok(filtered_stream(rx, pattern))
    }
}
