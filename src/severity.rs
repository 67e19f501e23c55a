//! Severity grading.
//!
//! A pure, total function of the total detection count. Thresholds are
//! fixed policy: fewer than [`MEDIUM_THRESHOLD`] detections is low, fewer
//! than [`HIGH_THRESHOLD`] is medium, anything above is high. Closed-open
//! bands, no hysteresis, no history.

use crate::error::InvalidCountError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MEDIUM_THRESHOLD: u64 = 3;
pub const HIGH_THRESHOLD: u64 = 6;

/// Three-tier ordinal severity. Serialized forms keep the reference
/// system's Indonesian strings, which is also what the database stores.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SeverityLevel {
    #[serde(rename = "rendah")]
    Low,
    #[serde(rename = "sedang")]
    Medium,
    #[serde(rename = "tinggi")]
    High,
}

impl SeverityLevel {
    /// Grades a non-negative total. Zero detections is the lowest severity,
    /// not an error.
    pub fn for_total(total: u64) -> Self {
        if total < MEDIUM_THRESHOLD {
            SeverityLevel::Low
        } else if total < HIGH_THRESHOLD {
            SeverityLevel::Medium
        } else {
            SeverityLevel::High
        }
    }

    /// Signed-count entry point for callers working with database integers.
    /// A negative total is a caller contract violation.
    pub fn from_total(total: i64) -> Result<Self, InvalidCountError> {
        let total = u64::try_from(total).map_err(|_| InvalidCountError(total))?;
        Ok(Self::for_total(total))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SeverityLevel::Low => "rendah",
            SeverityLevel::Medium => "sedang",
            SeverityLevel::High => "tinggi",
        }
    }
}

impl fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeverityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rendah" => Ok(SeverityLevel::Low),
            "sedang" => Ok(SeverityLevel::Medium),
            "tinggi" => Ok(SeverityLevel::High),
            other => Err(format!("unknown severity level '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_are_closed_open() {
        assert_eq!(SeverityLevel::from_total(0).unwrap(), SeverityLevel::Low);
        assert_eq!(SeverityLevel::from_total(2).unwrap(), SeverityLevel::Low);
        assert_eq!(SeverityLevel::from_total(3).unwrap(), SeverityLevel::Medium);
        assert_eq!(SeverityLevel::from_total(5).unwrap(), SeverityLevel::Medium);
        assert_eq!(SeverityLevel::from_total(6).unwrap(), SeverityLevel::High);
        assert_eq!(SeverityLevel::from_total(100).unwrap(), SeverityLevel::High);
    }

    #[test]
    fn negative_total_is_a_contract_violation() {
        assert_eq!(SeverityLevel::from_total(-1), Err(InvalidCountError(-1)));
    }

    #[test]
    fn levels_are_ordered() {
        assert!(SeverityLevel::Low < SeverityLevel::Medium);
        assert!(SeverityLevel::Medium < SeverityLevel::High);
    }

    #[test]
    fn serializes_to_reference_strings() {
        assert_eq!(
            serde_json::to_string(&SeverityLevel::Medium).unwrap(),
            "\"sedang\""
        );
        let parsed: SeverityLevel = serde_json::from_str("\"tinggi\"").unwrap();
        assert_eq!(parsed, SeverityLevel::High);
        assert_eq!("rendah".parse::<SeverityLevel>(), Ok(SeverityLevel::Low));
        assert!("severe".parse::<SeverityLevel>().is_err());
    }
}
