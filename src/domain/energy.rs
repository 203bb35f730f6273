use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use super::types::Observation;

/// One power reading from the battery system, in watts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    #[serde(rename = "ts")]
    pub timestamp: DateTime<FixedOffset>,
    #[serde(rename = "consumption")]
    pub consumption_w: i64,
    #[serde(rename = "production")]
    pub production_w: i64,
}

impl Stat {
    pub fn consumption(&self) -> Observation {
        Observation::new(self.timestamp.with_timezone(&Utc), self.consumption_w as f64)
    }

    pub fn production(&self) -> Observation {
        Observation::new(self.timestamp.with_timezone(&Utc), self.production_w as f64)
    }
}
