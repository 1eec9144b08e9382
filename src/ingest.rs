//! Newline-delimited JSON sample decoding for the command-line front end.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::types::Sample;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid sample json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("device_id is required")]
    MissingDeviceId,
    #[error("rps must be a finite, non-negative number (got {0})")]
    InvalidValue(f64),
}

#[derive(Deserialize)]
struct RawSample {
    #[serde(default)]
    device_id: String,
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    cpu: f64,
    #[serde(default)]
    memory: f64,
    #[serde(default)]
    rps: f64,
    #[serde(default)]
    network: f64,
}

/// Decode and validate one input line. A missing timestamp is stamped now.
pub fn parse_line(line: &str) -> Result<Sample, IngestError> {
    let raw: RawSample = serde_json::from_str(line)?;

    if raw.device_id.trim().is_empty() {
        return Err(IngestError::MissingDeviceId);
    }
    if !raw.rps.is_finite() || raw.rps < 0.0 {
        return Err(IngestError::InvalidValue(raw.rps));
    }

    Ok(Sample {
        device_id: raw.device_id,
        timestamp: raw.timestamp.unwrap_or_else(Utc::now),
        cpu: raw.cpu,
        memory: raw.memory,
        rps: raw.rps,
        network: raw.network,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_sample() {
        let s = parse_line(
            r#"{"device_id":"edge-1","timestamp":"2024-05-01T10:00:00Z","cpu":41.5,"memory":63.0,"rps":120.0,"network":8.2}"#,
        )
        .unwrap();
        assert_eq!(s.device_id, "edge-1");
        assert_eq!(s.rps, 120.0);
        assert_eq!(s.timestamp.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }

    #[test]
    fn defaults_missing_timestamp_and_gauges() {
        let before = Utc::now();
        let s = parse_line(r#"{"device_id":"edge-1","rps":3}"#).unwrap();
        assert!(s.timestamp >= before);
        assert_eq!(s.cpu, 0.0);
    }

    #[test]
    fn rejects_bad_lines() {
        assert!(matches!(parse_line("{"), Err(IngestError::Json(_))));
        assert!(matches!(
            parse_line(r#"{"device_id":"","rps":1}"#),
            Err(IngestError::MissingDeviceId)
        ));
        assert!(matches!(
            parse_line(r#"{"rps":1}"#),
            Err(IngestError::MissingDeviceId)
        ));
        assert!(matches!(
            parse_line(r#"{"device_id":"a","rps":-1}"#),
            Err(IngestError::InvalidValue(_))
        ));
    }
}
