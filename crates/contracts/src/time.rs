//! Date-and-time normalization
//!
//! Externally supplied timestamps carry up to microsecond precision and may
//! have trailing zeros trimmed. Scheduling works on the canonical
//! millisecond form `YYYY-MM-DDThh:mm:ss.mmmZ`.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::time::Duration;

use crate::ContractError;

/// chrono format of the canonical wire form
pub const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

const SECONDS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const MILLIS_DIGITS: usize = 3;

/// Normalize one timestamp to `YYYY-MM-DDThh:mm:ss.mmmZ`.
///
/// Fractional seconds are truncated to three digits; fewer than three are
/// right-padded with zeros. Whole-second input gains `.000`.
///
/// # Errors
/// `MalformedTimestamp` when the input matches neither form.
pub fn ensure_format(value: &str) -> Result<String, ContractError> {
    let body = value
        .strip_suffix('Z')
        .ok_or_else(|| ContractError::malformed_timestamp(value, "missing trailing 'Z'"))?;

    let (seconds, fraction) = match body.split_once('.') {
        Some((seconds, fraction)) => (seconds, fraction),
        None => (body, ""),
    };

    if !fraction.chars().all(|c| c.is_ascii_digit()) {
        return Err(ContractError::malformed_timestamp(
            value,
            "fractional seconds must be digits",
        ));
    }
    if body.contains('.') && fraction.is_empty() {
        return Err(ContractError::malformed_timestamp(
            value,
            "empty fractional seconds",
        ));
    }

    NaiveDateTime::parse_from_str(seconds, SECONDS_FORMAT)
        .map_err(|e| ContractError::malformed_timestamp(value, e.to_string()))?;

    let millis: String = fraction
        .chars()
        .chain(std::iter::repeat('0'))
        .take(MILLIS_DIGITS)
        .collect();

    Ok(format!("{seconds}.{millis}Z"))
}

/// Normalize an optional timestamp; absence is a valid "no constraint".
pub fn normalize(value: Option<&str>) -> Result<Option<String>, ContractError> {
    value.map(ensure_format).transpose()
}

/// Parse a timestamp (any accepted form) into an instant.
pub fn parse_instant(value: &str) -> Result<DateTime<Utc>, ContractError> {
    let canonical = ensure_format(value)?;
    NaiveDateTime::parse_from_str(&canonical, "%Y-%m-%dT%H:%M:%S%.fZ")
        .map(|naive| naive.and_utc())
        .map_err(|e| ContractError::malformed_timestamp(value, e.to_string()))
}

/// Render an instant in canonical form.
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.format(CANONICAL_FORMAT).to_string()
}

/// Current time in canonical form.
pub fn now_canonical() -> String {
    format_instant(Utc::now())
}

/// Time remaining until `instant`, clamped at zero.
pub fn delay_until(instant: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (instant - now).to_std().unwrap_or(Duration::ZERO)
}
