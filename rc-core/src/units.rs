//! Type-safe wrappers for physical units and session clock formatting
//!
//! The broadcasting protocol reports most quantities as raw integers or
//! floats; these newtypes keep distances and temperatures apart once they
//! leave the codec.

use serde::{Deserialize, Serialize};

/// Round f32 to 2 decimal places for compact JSON serialization
fn round2<S: serde::Serializer>(val: &f32, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f32((*val * 100.0).round() / 100.0)
}

/// Meters
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Meters(#[serde(serialize_with = "round2")] pub f32);

impl Meters {
    pub fn abs(self) -> Self {
        Meters(self.0.abs())
    }
}

/// Celsius
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Celsius(#[serde(serialize_with = "round2")] pub f32);

/// Percentage (0.0 to 1.0)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Percentage(#[serde(serialize_with = "round2")] pub f32);

impl Percentage {
    pub fn new(value: f32) -> Self {
        Self(value.clamp(0.0, 1.0))
    }

    /// Build from the protocol's tenths encoding (0..=10)
    pub fn from_tenths(raw: u8) -> Self {
        Self::new(f32::from(raw) / 10.0)
    }

    pub fn as_percent(&self) -> f32 {
        self.0 * 100.0
    }
}

/// Format a session clock value as `m:ss.mmm` (or `h:mm:ss.mmm`).
///
/// Negative values are prefixed with `-`.
pub fn format_duration(ms: i32) -> String {
    let sign = if ms < 0 { "-" } else { "" };
    let ms = i64::from(ms).abs();
    let millis = ms % 1000;
    let seconds = (ms / 1000) % 60;
    let minutes = (ms / 60_000) % 60;
    let hours = ms / 3_600_000;
    if hours > 0 {
        format!("{sign}{hours}:{minutes:02}:{seconds:02}.{millis:03}")
    } else {
        format!("{sign}{minutes}:{seconds:02}.{millis:03}")
    }
}

/// Format a signed time difference as `+s.mmm` / `-s.mmm`.
pub fn format_delta(ms: i32) -> String {
    let sign = if ms < 0 { '-' } else { '+' };
    let ms = i64::from(ms).abs();
    format!("{sign}{}.{:03}", ms / 1000, ms % 1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0:00.000");
        assert_eq!(format_duration(61_234), "1:01.234");
        assert_eq!(format_duration(3_723_004), "1:02:03.004");
        assert_eq!(format_duration(-1_500), "-0:01.500");
    }

    #[test]
    fn test_format_delta() {
        assert_eq!(format_delta(-1_200), "-1.200");
        assert_eq!(format_delta(450), "+0.450");
    }

    #[test]
    fn test_percentage_from_tenths() {
        assert_eq!(Percentage::from_tenths(3).0, 0.3);
        assert_eq!(Percentage::from_tenths(20).0, 1.0);
    }

    #[test]
    fn test_meters_serialize_rounds() {
        let json = serde_json::to_string(&Meters(1.23456)).unwrap();
        assert_eq!(json, "1.23");
    }
}
