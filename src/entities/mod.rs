// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/monitor-presence-rs

//! Entities module - downstream projection of presence state
//!
//! Entities are never read back as a source of truth. The engine can
//! rebuild everything from bus traffic; the store only mirrors it for
//! whoever consumes home-automation style entity states.

mod memory;
mod names;
mod projection;

pub use memory::MemoryEntityStore;
pub use names::EntityNames;
pub use projection::{mirror_message, spawn_state_mirror};

use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;

pub type Attributes = Map<String, Value>;

/// Current state of one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub state: String,
    pub attributes: Attributes,
    /// Last time `state` itself changed
    pub last_changed: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl EntityState {
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }
}

/// Emitted whenever an entity is written with a difference, or removed
#[derive(Debug, Clone, PartialEq)]
pub struct EntityChange {
    pub entity_id: String,
    pub old: Option<EntityState>,
    pub new: Option<EntityState>,
}

pub trait EntityStore: Send + Sync {
    fn exists(&self, entity_id: &str) -> bool;

    fn get(&self, entity_id: &str) -> Option<EntityState>;

    /// Update the state (when given) and merge `attributes` into the
    /// existing ones. Nothing is written or announced when the result is
    /// identical; returns whether a change happened.
    fn set(&self, entity_id: &str, state: Option<&str>, attributes: Attributes) -> bool;

    fn remove(&self, entity_id: &str) -> bool;

    /// Changes to one entity
    fn listen_for_change(&self, entity_id: &str) -> BoxStream<'static, EntityChange>;

    /// Changes to every entity
    fn subscribe(&self) -> broadcast::Receiver<EntityChange>;
}

/// Build an attribute map from `(name, value)` pairs.
pub fn attrs<I, K, V>(pairs: I) -> Attributes
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}
