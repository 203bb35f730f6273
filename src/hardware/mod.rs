pub mod sonnen;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Stat;

pub use sonnen::SonnenBattery;

/// Errors raised while reading a status sample from the battery system.
#[derive(Debug, Error)]
pub enum EnergyError {
    #[error("battery request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("battery responded with HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("battery status could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid battery timestamp {timestamp:?} with offset {offset}")]
    Timestamp { timestamp: String, offset: i32 },
}

/// Source of consumption/production samples.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConsumptionSource: Send + Sync {
    async fn stat(&self) -> Result<Stat, EnergyError>;
}
