// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/monitor-presence-rs

//! Household-wide aggregates derived from device verdicts

use serde::{Deserialize, Serialize};

use super::Verdict;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HouseholdState {
    pub somebody_home: bool,
    pub home_count: usize,
    pub everyone_home: bool,
    pub everyone_not_home: bool,
}

impl HouseholdState {
    /// Devices that never reported (`None`) are left out of both
    /// universality checks. With no known verdicts at all neither
    /// "everyone" aggregate holds.
    pub fn from_verdicts<I>(verdicts: I) -> Self
    where
        I: IntoIterator<Item = Option<Verdict>>,
    {
        let mut known = 0usize;
        let mut home = 0usize;
        for verdict in verdicts.into_iter().flatten() {
            known += 1;
            if verdict == Verdict::Home {
                home += 1;
            }
        }

        Self {
            somebody_home: home > 0,
            home_count: home,
            everyone_home: known > 0 && home == known,
            everyone_not_home: known > 0 && home == 0,
        }
    }
}

/// Aggregates whose value changed since the last recompute
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HouseholdChanges {
    pub somebody_home: Option<(bool, usize)>,
    pub everyone_home: Option<bool>,
    pub everyone_not_home: Option<bool>,
}

impl HouseholdChanges {
    pub fn is_empty(&self) -> bool {
        self.somebody_home.is_none()
            && self.everyone_home.is_none()
            && self.everyone_not_home.is_none()
    }
}

#[derive(Debug, Default)]
pub struct HouseholdAggregator {
    last: Option<HouseholdState>,
}

impl HouseholdAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<HouseholdState> {
        self.last
    }

    /// Recompute and report only what moved. The first recompute reports
    /// every aggregate.
    pub fn recompute<I>(&mut self, verdicts: I) -> (HouseholdState, HouseholdChanges)
    where
        I: IntoIterator<Item = Option<Verdict>>,
    {
        let next = HouseholdState::from_verdicts(verdicts);
        let mut changes = HouseholdChanges::default();

        match self.last {
            Some(prev) => {
                if prev.somebody_home != next.somebody_home || prev.home_count != next.home_count {
                    changes.somebody_home = Some((next.somebody_home, next.home_count));
                }
                if prev.everyone_home != next.everyone_home {
                    changes.everyone_home = Some(next.everyone_home);
                }
                if prev.everyone_not_home != next.everyone_not_home {
                    changes.everyone_not_home = Some(next.everyone_not_home);
                }
            }
            None => {
                changes.somebody_home = Some((next.somebody_home, next.home_count));
                changes.everyone_home = Some(next.everyone_home);
                changes.everyone_not_home = Some(next.everyone_not_home);
            }
        }

        self.last = Some(next);
        (next, changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_verdicts_are_excluded_from_universality() {
        let state = HouseholdState::from_verdicts([Some(Verdict::Home), None]);
        assert!(state.everyone_home);
        assert!(state.somebody_home);
        assert_eq!(state.home_count, 1);

        let state = HouseholdState::from_verdicts([Some(Verdict::Away), None]);
        assert!(state.everyone_not_home);
        assert!(!state.somebody_home);
    }

    #[test]
    fn empty_household_is_neither_everyone_state() {
        let state = HouseholdState::from_verdicts([None, None]);
        assert!(!state.everyone_home);
        assert!(!state.everyone_not_home);
        assert!(!state.somebody_home);
    }

    #[test]
    fn mixed_household() {
        let state = HouseholdState::from_verdicts([Some(Verdict::Home), Some(Verdict::Away)]);
        assert!(state.somebody_home);
        assert!(!state.everyone_home);
        assert!(!state.everyone_not_home);
    }

    #[test]
    fn recompute_is_idempotent() {
        let mut agg = HouseholdAggregator::new();
        let verdicts = [Some(Verdict::Home), Some(Verdict::Home)];
        let (_, first) = agg.recompute(verdicts);
        assert_eq!(first.everyone_home, Some(true));

        let (state, second) = agg.recompute(verdicts);
        assert!(state.everyone_home);
        assert!(second.is_empty());
    }

    #[test]
    fn count_change_alone_republishes_somebody_home() {
        let mut agg = HouseholdAggregator::new();
        agg.recompute([Some(Verdict::Home), Some(Verdict::Away)]);
        let (_, changes) = agg.recompute([Some(Verdict::Home), Some(Verdict::Home)]);
        assert_eq!(changes.somebody_home, Some((true, 2)));
        assert_eq!(changes.everyone_home, Some(true));
        assert_eq!(changes.everyone_not_home, None);
    }
}
