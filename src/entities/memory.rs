// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/monitor-presence-rs

use std::collections::BTreeMap;
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::trace;

use super::{Attributes, EntityChange, EntityState, EntityStore};

/// Entity store held in process memory
pub struct MemoryEntityStore {
    entities: RwLock<BTreeMap<String, EntityState>>,
    changes: broadcast::Sender<EntityChange>,
}

impl MemoryEntityStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(512);
        Self {
            entities: RwLock::new(BTreeMap::new()),
            changes,
        }
    }

    /// State string of an entity, if present
    pub fn state_of(&self, entity_id: &str) -> Option<String> {
        self.entities.read().get(entity_id).map(|e| e.state.clone())
    }
}

impl Default for MemoryEntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore for MemoryEntityStore {
    fn exists(&self, entity_id: &str) -> bool {
        self.entities.read().contains_key(entity_id)
    }

    fn get(&self, entity_id: &str) -> Option<EntityState> {
        self.entities.read().get(entity_id).cloned()
    }

    fn set(&self, entity_id: &str, state: Option<&str>, attributes: Attributes) -> bool {
        let now = Utc::now();
        let mut entities = self.entities.write();
        let old = entities.get(entity_id).cloned();

        let mut next = old.clone().unwrap_or_else(|| EntityState {
            state: String::new(),
            attributes: Attributes::new(),
            last_changed: now,
            last_updated: now,
        });
        if let Some(state) = state {
            if next.state != state {
                next.state = state.to_string();
                next.last_changed = now;
            }
        }
        next.attributes.extend(attributes);

        let unchanged = old
            .as_ref()
            .map(|o| o.state == next.state && o.attributes == next.attributes)
            .unwrap_or(false);
        if unchanged {
            return false;
        }

        next.last_updated = now;
        trace!(entity = entity_id, state = %next.state, "Entity updated");
        entities.insert(entity_id.to_string(), next.clone());
        drop(entities);

        let _ = self.changes.send(EntityChange {
            entity_id: entity_id.to_string(),
            old,
            new: Some(next),
        });
        true
    }

    fn remove(&self, entity_id: &str) -> bool {
        let old = self.entities.write().remove(entity_id);
        match old {
            Some(old) => {
                let _ = self.changes.send(EntityChange {
                    entity_id: entity_id.to_string(),
                    old: Some(old),
                    new: None,
                });
                true
            }
            None => false,
        }
    }

    fn listen_for_change(&self, entity_id: &str) -> BoxStream<'static, EntityChange> {
        let rx = self.changes.subscribe();
        stream::unfold((rx, entity_id.to_string()), |(mut rx, id)| async move {
            loop {
                match rx.recv().await {
                    Ok(change) if change.entity_id == id => return Some((change, (rx, id))),
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }

    fn subscribe(&self) -> broadcast::Receiver<EntityChange> {
        self.changes.subscribe()
    }
}
