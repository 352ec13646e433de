// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/monitor-presence-rs

//! Task scheduler for timed operations
//!
//! Timers are keyed: scheduling under a key that already has a live timer
//! aborts the old one first, so each key owns at most one outstanding
//! timer. Expiry does not run a callback directly; it sends a
//! [`TimerFired`] back to the owner's inbox, where [`Scheduler::claim`]
//! rejects firings that were canceled or superseded after they were
//! queued.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, trace};

/// Delivered to the owner when a timer expires
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerFired<K> {
    pub key: K,
    pub generation: u64,
}

struct ScheduledTask {
    generation: u64,
    periodic: bool,
    task: JoinHandle<()>,
}

pub struct Scheduler<K> {
    tasks: HashMap<K, ScheduledTask>,
    fired_tx: mpsc::UnboundedSender<TimerFired<K>>,
    next_generation: u64,
}

impl<K> Scheduler<K>
where
    K: Clone + Debug + Eq + Hash + Send + 'static,
{
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerFired<K>>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        (
            Self {
                tasks: HashMap::new(),
                fired_tx,
                next_generation: 1,
            },
            fired_rx,
        )
    }

    /// One-shot timer; supersedes any timer already held by `key`.
    pub fn schedule(&mut self, key: K, delay: Duration) {
        self.cancel(&key);
        let generation = self.bump();
        let tx = self.fired_tx.clone();
        let fired = TimerFired { key: key.clone(), generation };
        let deadline = Instant::now() + delay;

        let task = tokio::spawn(async move {
            sleep_until(deadline).await;
            let _ = tx.send(fired);
        });

        debug!("Scheduled {:?} in {:?}", key, delay);
        self.tasks
            .insert(key, ScheduledTask { generation, periodic: false, task });
    }

    /// Repeating timer; first fires after `first`, then every `period`.
    pub fn schedule_every(&mut self, key: K, first: Duration, period: Duration) {
        self.cancel(&key);
        let generation = self.bump();
        let tx = self.fired_tx.clone();
        let fired = TimerFired { key: key.clone(), generation };
        let start = Instant::now() + first;

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.send(fired.clone()).is_err() {
                    break;
                }
            }
        });

        debug!("Scheduled {:?} every {:?} (first in {:?})", key, period, first);
        self.tasks
            .insert(key, ScheduledTask { generation, periodic: true, task });
    }

    /// Cancel whatever timer `key` holds. Idempotent.
    pub fn cancel(&mut self, key: &K) -> bool {
        match self.tasks.remove(key) {
            Some(scheduled) => {
                scheduled.task.abort();
                trace!("Canceled {:?}", key);
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, scheduled) in self.tasks.drain() {
            scheduled.task.abort();
        }
    }

    /// True while `key` has a timer that has not yet been claimed.
    pub fn is_pending(&self, key: &K) -> bool {
        self.tasks.contains_key(key)
    }

    /// Accept a firing if it belongs to the live timer for its key.
    ///
    /// A claimed one-shot timer is released; periodic timers stay armed.
    /// Stale firings (canceled or superseded after being queued) return
    /// false and must be ignored.
    pub fn claim(&mut self, fired: &TimerFired<K>) -> bool {
        let periodic = match self.tasks.get(&fired.key) {
            Some(s) if s.generation == fired.generation => s.periodic,
            _ => {
                trace!("Ignoring stale firing of {:?}", fired.key);
                return false;
            }
        };
        if !periodic {
            self.tasks.remove(&fired.key);
        }
        true
    }

    fn bump(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }
}

impl<K> Drop for Scheduler<K> {
    fn drop(&mut self) {
        for (_, scheduled) in self.tasks.drain() {
            scheduled.task.abort();
        }
    }
}
