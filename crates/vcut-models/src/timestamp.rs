//! Timestamp parsing for trim bounds.
//!
//! Trim bounds arrive either as plain numbers of seconds or as strings in
//! the `HH:MM:SS`, `HH:MM:SS.mmm`, `MM:SS` or `SS` formats.

use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Maximum reasonable video duration (24 hours in seconds).
pub const MAX_VIDEO_DURATION_SECS: f64 = 86400.0;

/// Parse a timestamp string to total seconds.
///
/// # Examples
/// ```
/// use vcut_models::timestamp::parse_timestamp;
/// assert_eq!(parse_timestamp("01:30:00").unwrap(), 5400.0);
/// assert_eq!(parse_timestamp("05:30").unwrap(), 330.0);
/// assert_eq!(parse_timestamp("90").unwrap(), 90.0);
/// ```
pub fn parse_timestamp(ts: &str) -> Result<f64, TimestampError> {
    let ts = ts.trim();
    if ts.is_empty() {
        return Err(TimestampError::Empty);
    }

    let parts: Vec<&str> = ts.split(':').collect();
    if parts.len() > 3 {
        return Err(TimestampError::InvalidFormat(ts.to_string()));
    }

    const COMPONENTS: [&str; 3] = ["hours", "minutes", "seconds"];
    let offset = COMPONENTS.len() - parts.len();

    let mut total = 0.0;
    for (i, part) in parts.iter().enumerate() {
        let component = COMPONENTS[offset + i];
        let value: f64 = part
            .parse()
            .map_err(|_| TimestampError::InvalidValue(component, part.to_string()))?;
        if value < 0.0 || !value.is_finite() {
            return Err(TimestampError::Negative);
        }
        total = total * 60.0 + value;
    }

    Ok(total)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTime {
    Seconds(f64),
    Text(String),
}

/// Deserialize a trim bound given as seconds or as a timestamp string.
pub fn deserialize_seconds<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match RawTime::deserialize(deserializer)? {
        RawTime::Seconds(secs) if secs >= 0.0 && secs.is_finite() => Ok(secs),
        RawTime::Seconds(_) => Err(serde::de::Error::custom(TimestampError::Negative)),
        RawTime::Text(text) => parse_timestamp(&text).map_err(serde::de::Error::custom),
    }
}

/// Timestamp parsing error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimestampError {
    #[error("Timestamp cannot be empty")]
    Empty,

    #[error("Timestamp cannot be negative")]
    Negative,

    #[error("Invalid {0} value: {1}")]
    InvalidValue(&'static str, String),

    #[error("Invalid timestamp format '{0}'. Use HH:MM:SS, HH:MM:SS.mmm, MM:SS, or SS")]
    InvalidFormat(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_hh_mm_ss() {
        assert_eq!(parse_timestamp("00:00:00").unwrap(), 0.0);
        assert_eq!(parse_timestamp("01:00:00").unwrap(), 3600.0);
        assert_eq!(parse_timestamp("01:30:45").unwrap(), 5445.0);
    }

    #[test]
    fn test_parse_timestamp_short_forms() {
        assert_eq!(parse_timestamp("05:30").unwrap(), 330.0);
        assert_eq!(parse_timestamp("90").unwrap(), 90.0);
        let result = parse_timestamp("00:00:30.500").unwrap();
        assert!((result - 30.5).abs() < 0.001);
    }

    #[test]
    fn test_parse_timestamp_errors() {
        assert!(matches!(parse_timestamp(""), Err(TimestampError::Empty)));
        assert!(matches!(parse_timestamp("abc"), Err(TimestampError::InvalidValue(_, _))));
        assert!(matches!(parse_timestamp("1:2:3:4"), Err(TimestampError::InvalidFormat(_))));
        assert!(matches!(parse_timestamp("-5"), Err(TimestampError::Negative)));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            parse_timestamp("1:xx").unwrap_err().to_string(),
            "Invalid seconds value: xx"
        );
        assert_eq!(
            TimestampError::InvalidFormat("1:2:3:4".into()).to_string(),
            "Invalid timestamp format '1:2:3:4'. Use HH:MM:SS, HH:MM:SS.mmm, MM:SS, or SS"
        );
    }

    #[test]
    fn test_deserialize_seconds_accepts_numbers_and_strings() {
        #[derive(Deserialize)]
        struct Bound {
            #[serde(deserialize_with = "deserialize_seconds")]
            at: f64,
        }

        let n: Bound = serde_json::from_str(r#"{"at": 12.5}"#).unwrap();
        assert_eq!(n.at, 12.5);

        let s: Bound = serde_json::from_str(r#"{"at": "00:01:05"}"#).unwrap();
        assert_eq!(s.at, 65.0);

        assert!(serde_json::from_str::<Bound>(r#"{"at": -1}"#).is_err());
    }
}
