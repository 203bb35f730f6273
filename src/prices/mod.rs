pub mod cache;
pub mod elpriset;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::{Price, PriceArea, TodaysPrices, HOURS_PER_DAY};

pub use cache::{FilePriceCache, MemPriceCache, PriceCache};
pub use elpriset::ElprisetJustNuClient;

#[derive(Debug, Error)]
pub enum PriceError {
    #[error("could not fetch price list: {0}")]
    Fetch(String),
    #[error("could not parse price list: {0}")]
    Parse(String),
    #[error("could not persist price list cache: {0}")]
    Persist(String),
}

impl From<reqwest::Error> for PriceError {
    fn from(e: reqwest::Error) -> Self {
        PriceError::Fetch(e.to_string())
    }
}

/// Upstream provider of day-ahead price lists.
///
/// Returns the raw JSON body for `area` on `date`; parsing is left to
/// [`parse_price_list`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch(&self, area: PriceArea, date: NaiveDate) -> Result<String, PriceError>;
}

/// Parse a raw price list body into a snapshot.
///
/// Anything but exactly one entry per hour is rejected.
pub fn parse_price_list(body: &str) -> Result<TodaysPrices, PriceError> {
    let prices: Vec<Price> =
        serde_json::from_str(body).map_err(|e| PriceError::Parse(e.to_string()))?;
    if prices.len() != HOURS_PER_DAY {
        return Err(PriceError::Parse(format!(
            "expected {HOURS_PER_DAY} hourly prices, got {}",
            prices.len()
        )));
    }
    Ok(TodaysPrices::new(prices))
}
