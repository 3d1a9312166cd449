//! Duration parsing for configuration files.
//!
//! Durations are written in humantime form: `10s`, `500ms`, `1m 30s`.

use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Parse a humantime duration string.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    humantime::parse_duration(s.trim())
        .map_err(|e| format!("invalid duration '{s}': {e} (expected e.g. 10s, 500ms)"))
}

/// Deserialize an optional duration from a string.
pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    match opt {
        Some(s) => parse_duration(&s)
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}
