// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/monitor-presence-rs

//! Scan coordinator
//!
//! Tracks which monitors are mid-scan and decides whether a scan request
//! may go out now. The coordinator never publishes or sleeps itself; it
//! answers with a decision and the engine performs it, which keeps the
//! state machine testable without a bus or a clock.

use std::collections::BTreeSet;
use tracing::debug;

use super::ScanPhase;

/// What to do with an arrival scan request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArriveDecision {
    PublishNow,
    /// Fleet is busy; publish on the next idle transition
    Deferred,
    /// A watcher is already registered or an arrival scan is running
    Coalesced,
}

/// What to do when a departure scan timer fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepartDecision {
    /// Publish, then schedule `next_attempt` if there is one
    Publish { next_attempt: Option<u32> },
    /// Fleet is busy; try the same attempt again after the backoff
    Retry { attempt: u32 },
}

/// Result of a location finishing its scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanEnd {
    pub became_idle: bool,
    /// A deferred arrival scan is now due
    pub release_arrive: bool,
}

#[derive(Debug)]
pub struct ScanCoordinator {
    active: BTreeSet<String>,
    scan_type: Option<String>,
    arrive_waiting: bool,
    max_depart_scans: u32,
}

impl ScanCoordinator {
    pub fn new(max_depart_scans: u32) -> Self {
        Self {
            active: BTreeSet::new(),
            scan_type: None,
            arrive_waiting: false,
            max_depart_scans,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_empty()
    }

    pub fn phase(&self) -> ScanPhase {
        if self.active.is_empty() {
            ScanPhase::Idle
        } else {
            ScanPhase::Scanning {
                scan_type: self.scan_type.clone().unwrap_or_default(),
                locations: self.active.iter().cloned().collect(),
            }
        }
    }

    /// Last scan type reported, kept after the fleet returns to idle.
    pub fn scan_type(&self) -> Option<&str> {
        self.scan_type.as_deref()
    }

    pub fn active_locations(&self) -> impl Iterator<Item = &String> {
        self.active.iter()
    }

    pub fn arrive_waiting(&self) -> bool {
        self.arrive_waiting
    }

    /// A location began scanning. Returns true on the idle to scanning edge.
    pub fn start(&mut self, location: &str, scan_type: &str) -> bool {
        let was_idle = self.active.is_empty();
        self.active.insert(location.to_string());
        self.scan_type = Some(scan_type.to_string());
        if was_idle {
            debug!(location, scan_type, "Scanner fleet now scanning");
        }
        was_idle
    }

    pub fn end(&mut self, location: &str) -> ScanEnd {
        let removed = self.active.remove(location);
        if !removed || !self.active.is_empty() {
            return ScanEnd::default();
        }
        debug!(location, "Scanner fleet now idle");
        let release_arrive = std::mem::take(&mut self.arrive_waiting);
        ScanEnd { became_idle: true, release_arrive }
    }

    /// Drop a location that went away mid-scan so the fleet cannot stay
    /// stuck in `scanning`.
    pub fn forget(&mut self, location: &str) -> ScanEnd {
        self.end(location)
    }

    pub fn request_arrive(&mut self) -> ArriveDecision {
        if self.is_idle() {
            return ArriveDecision::PublishNow;
        }
        let arrival_running = matches!(self.scan_type.as_deref(), Some("arrive") | Some("arrival"));
        if self.arrive_waiting || arrival_running {
            return ArriveDecision::Coalesced;
        }
        self.arrive_waiting = true;
        ArriveDecision::Deferred
    }

    /// Departure scans go out only while idle. Attempts are counted from
    /// one; every attempt up to the configured maximum schedules a follow-up.
    pub fn depart_fired(&self, attempt: u32) -> DepartDecision {
        if !self.is_idle() {
            return DepartDecision::Retry { attempt };
        }
        let next_attempt = if attempt <= self.max_depart_scans {
            Some(attempt + 1)
        } else {
            None
        };
        DepartDecision::Publish { next_attempt }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlapping_scans_end_idle() {
        let mut coordinator = ScanCoordinator::new(3);
        assert!(coordinator.start("a", "arrive"));
        assert!(!coordinator.start("b", "arrive"));
        assert!(!coordinator.end("a").became_idle);
        assert!(coordinator.end("b").became_idle);
        assert_eq!(coordinator.phase(), ScanPhase::Idle);
    }

    #[test]
    fn single_cycle_leaves_no_active_locations() {
        let mut coordinator = ScanCoordinator::new(3);
        coordinator.start("a", "depart");
        assert!(matches!(coordinator.phase(), ScanPhase::Scanning { .. }));
        coordinator.end("a");
        assert_eq!(coordinator.active_locations().count(), 0);
        assert!(coordinator.is_idle());
    }

    #[test]
    fn start_is_idempotent_per_location() {
        let mut coordinator = ScanCoordinator::new(3);
        coordinator.start("a", "arrive");
        coordinator.start("a", "arrive");
        assert!(coordinator.end("a").became_idle);
    }

    #[test]
    fn end_from_unknown_location_is_ignored() {
        let mut coordinator = ScanCoordinator::new(3);
        assert_eq!(coordinator.end("ghost"), ScanEnd::default());
        coordinator.start("a", "arrive");
        assert_eq!(coordinator.end("ghost"), ScanEnd::default());
        assert!(!coordinator.is_idle());
    }

    #[test]
    fn arrive_requests_coalesce_while_busy() {
        let mut coordinator = ScanCoordinator::new(3);
        assert_eq!(coordinator.request_arrive(), ArriveDecision::PublishNow);

        coordinator.start("a", "depart");
        assert_eq!(coordinator.request_arrive(), ArriveDecision::Deferred);
        assert_eq!(coordinator.request_arrive(), ArriveDecision::Coalesced);

        let end = coordinator.end("a");
        assert!(end.release_arrive);
        assert!(!coordinator.arrive_waiting());
    }

    #[test]
    fn arrive_request_during_arrival_scan_is_dropped() {
        let mut coordinator = ScanCoordinator::new(3);
        coordinator.start("a", "arrive");
        assert_eq!(coordinator.request_arrive(), ArriveDecision::Coalesced);
        assert!(!coordinator.end("a").release_arrive);
    }

    #[test]
    fn depart_attempts_are_bounded() {
        let coordinator = ScanCoordinator::new(3);
        assert_eq!(coordinator.depart_fired(1), DepartDecision::Publish { next_attempt: Some(2) });
        assert_eq!(coordinator.depart_fired(3), DepartDecision::Publish { next_attempt: Some(4) });
        assert_eq!(coordinator.depart_fired(4), DepartDecision::Publish { next_attempt: None });
    }

    #[test]
    fn busy_depart_keeps_its_attempt() {
        let mut coordinator = ScanCoordinator::new(3);
        coordinator.start("a", "arrive");
        assert_eq!(coordinator.depart_fired(2), DepartDecision::Retry { attempt: 2 });
    }
}
