use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::EnumIter;

// ============================================================================
// Observations
// ============================================================================

/// A single `(timestamp, value)` sample of a time series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Observation {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

impl std::fmt::Display for Observation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {:.6}", self.timestamp.to_rfc3339(), self.value)
    }
}

// ============================================================================
// Units
// ============================================================================

/// Round to two decimals, half away from zero.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Convert watts to kilowatts rounded to two decimals.
pub fn watts_to_kw(watts: f64) -> f64 {
    round2(watts / 1000.0)
}

// ============================================================================
// Geographic and Market Types
// ============================================================================

/// Swedish bidding zones. The set is closed: every per-region table and cache
/// is keyed by one of these.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, EnumIter)]
#[serde(rename_all = "UPPERCASE")]
pub enum PriceArea {
    SE1,
    SE2,
    SE3,
    SE4,
}

impl PriceArea {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SE1 => "SE1",
            Self::SE2 => "SE2",
            Self::SE3 => "SE3",
            Self::SE4 => "SE4",
        }
    }
}

impl std::fmt::Display for PriceArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PriceArea {
    type Err = &'static str;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SE1" => Ok(Self::SE1),
            "SE2" => Ok(Self::SE2),
            "SE3" => Ok(Self::SE3),
            "SE4" => Ok(Self::SE4),
            _ => Err("invalid area; expected SE1..SE4"),
        }
    }
}
