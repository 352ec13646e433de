// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/monitor-presence-rs

use super::LocationReading;

/// Location with the strongest live signal, or `None` when no scanner
/// holds a usable sample. Ties go to the reading seen first.
pub fn resolve_nearest(readings: &[LocationReading]) -> Option<String> {
    readings
        .iter()
        .filter(|r| !r.is_cleared())
        .filter_map(|r| r.signal_strength.map(|s| (r, s)))
        .fold(None::<(&LocationReading, i32)>, |best, (reading, strength)| match best {
            Some((_, top)) if strength <= top => best,
            _ => Some((reading, strength)),
        })
        .map(|(reading, _)| reading.location.clone())
}
