// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/monitor-presence-rs

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::ProtocolError;

/// JSON body of a confidence report
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfidencePayload {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub confidence: Option<Value>,
    #[serde(deserialize_with = "id_text")]
    pub id: Option<String>,
    pub name: Option<String>,
    pub rssi: Option<Value>,
    /// Publishing monitor; overrides the location in the topic
    pub identity: Option<String>,
}

/// Beacon ids are sometimes published as bare numbers.
fn id_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(id) => Some(id),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    })
}

/// Confidence may arrive as a number or a numeric string. Fractions are
/// truncated and the result clamped to 0..=100.
pub fn parse_confidence(value: &Value) -> Result<u8, ProtocolError> {
    let raw = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match raw {
        Some(v) if v.is_finite() => Ok(v.trunc().clamp(0.0, 100.0) as u8),
        _ => Err(ProtocolError::BadConfidence(value.to_string())),
    }
}

/// Signal strength as a number or numeric string. `unknown` and anything
/// else unparseable yield `None`.
pub fn parse_signal_strength(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_i64().map(|v| v as i32).or_else(|| n.as_f64().map(|v| v as i32)),
        Value::String(s) => parse_signal_text(s),
        _ => None,
    }
}

pub(crate) fn parse_signal_text(raw: &str) -> Option<i32> {
    let trimmed = raw.trim();
    trimmed
        .parse::<i32>()
        .ok()
        .or_else(|| trimmed.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v as i32))
}

/// Gateway sensor payloads: `Some(true)` when open, `Some(false)` when
/// closed, `None` for anything unrecognized.
pub fn parse_gateway_state(payload: &str) -> Option<bool> {
    match payload.trim().to_lowercase().as_str() {
        "on" | "y" | "yes" | "true" | "home" | "opened" | "open" | "unlocked" => Some(true),
        "off" | "n" | "no" | "false" | "away" | "closed" | "locked" => Some(false),
        _ => None,
    }
}
