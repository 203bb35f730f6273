//! sonnenBatterie JSON API v2 client

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{ConsumptionSource, EnergyError};
use crate::domain::Stat;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Clone)]
pub struct SonnenBattery {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl SonnenBattery {
    pub fn new(
        host: &str,
        port: u16,
        token: String,
        timeout: Duration,
    ) -> Result<Self, EnergyError> {
        Self::with_base_url(format!("http://{host}:{port}/api/v2"), token, timeout)
    }

    pub fn with_base_url(
        base_url: String,
        token: String,
        timeout: Duration,
    ) -> Result<Self, EnergyError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("energy-ledger/0.1"));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn status(&self) -> Result<LatestData, EnergyError> {
        let url = format!("{}/latestdata", self.base_url);
        debug!(%url, "fetching battery status");
        let resp = self
            .client
            .get(&url)
            .header("Auth-Token", &self.token)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(EnergyError::Status(status));
        }
        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl ConsumptionSource for SonnenBattery {
    async fn stat(&self) -> Result<Stat, EnergyError> {
        self.status().await?.stat()
    }
}

#[derive(Debug, Deserialize)]
struct LatestData {
    #[serde(rename = "Consumption_W")]
    consumption_w: i64,
    #[serde(rename = "Production_W")]
    production_w: i64,
    #[serde(rename = "Timestamp")]
    timestamp: String,
    // The device spells it this way.
    #[serde(rename = "UTC_Offet")]
    utc_offset: i32,
}

impl LatestData {
    fn stat(&self) -> Result<Stat, EnergyError> {
        Ok(Stat {
            timestamp: local_timestamp(&self.timestamp, self.utc_offset)?,
            consumption_w: self.consumption_w,
            production_w: self.production_w,
        })
    }
}

/// Combine a zone-less local timestamp with a whole-hour UTC offset.
fn local_timestamp(
    timestamp: &str,
    offset_hours: i32,
) -> Result<DateTime<FixedOffset>, EnergyError> {
    let invalid = || EnergyError::Timestamp {
        timestamp: timestamp.to_string(),
        offset: offset_hours,
    };
    let naive = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).map_err(|_| invalid())?;
    let offset = offset_hours
        .checked_mul(3600)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(invalid)?;
    offset.from_local_datetime(&naive).single().ok_or_else(invalid)
}
