// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/monitor-presence-rs

//! Core engine module - owns and drives every presence state machine

mod engine;
mod event_bus;
mod scheduler;

pub use engine::{Engine, EngineCommand, EngineHandle};
pub use event_bus::{Event, EventBus, EventPayload, EventType};
pub use scheduler::{Scheduler, TimerFired};
