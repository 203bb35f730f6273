use chrono::{DateTime, FixedOffset, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::types::{round2, Observation};

/// Number of hourly prices in a complete day-ahead price list.
pub const HOURS_PER_DAY: usize = 24;

/// One hourly spot price, valid from `start` to `end`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    #[serde(rename = "SEK_per_kWh")]
    pub sek_per_kwh: f64,
    #[serde(rename = "EUR_per_kWh")]
    pub eur_per_kwh: f64,
    #[serde(rename = "EXR")]
    pub exchange_rate: f64,
    #[serde(rename = "time_start")]
    pub start: DateTime<FixedOffset>,
    #[serde(rename = "time_end")]
    pub end: DateTime<FixedOffset>,
}

impl Price {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant <= self.end
    }

    pub fn as_observation(&self) -> Observation {
        Observation::new(self.start.with_timezone(&Utc), self.sek_per_kwh)
    }
}

/// Snapshot of one day's price list for a region.
///
/// Built once from the raw list; the hourly index and mean price are derived at
/// construction and never change afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TodaysPrices {
    prices: Vec<Price>,
    hourly: HashMap<u32, Price>,
    mean_price: f64,
}

impl TodaysPrices {
    pub fn new(prices: Vec<Price>) -> Self {
        let mut hourly = HashMap::with_capacity(prices.len());
        let mut total = 0.0;
        for p in &prices {
            hourly.insert(p.start.hour(), p.clone());
            total += p.sek_per_kwh;
        }
        let mean_price = round2(total / HOURS_PER_DAY as f64);
        Self {
            prices,
            hourly,
            mean_price,
        }
    }

    pub fn prices(&self) -> &[Price] {
        &self.prices
    }

    pub fn mean_price(&self) -> f64 {
        self.mean_price
    }

    /// Price whose start falls on `hour` (0-23) of the list's local day.
    pub fn hourly(&self, hour: u32) -> Option<&Price> {
        self.hourly.get(&hour)
    }

    /// Price whose validity interval contains `instant`.
    pub fn price_at(&self, instant: DateTime<Utc>) -> Option<&Price> {
        self.prices.iter().find(|p| p.contains(instant))
    }

    pub fn first(&self) -> Option<&Price> {
        self.prices.first()
    }

    pub fn last(&self) -> Option<&Price> {
        self.prices.last()
    }

    pub fn is_valid(&self) -> bool {
        self.prices.len() == HOURS_PER_DAY
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.last() {
            Some(last) if self.is_valid() => now >= last.end,
            _ => true,
        }
    }

    pub fn observations(&self) -> Vec<Observation> {
        self.prices.iter().map(Price::as_observation).collect()
    }
}
