use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use std::time::Duration;
use tracing::debug;

use super::{PriceError, PriceSource};
use crate::domain::PriceArea;

/// Client for the elprisetjustnu.se day-ahead price API.
#[derive(Clone)]
pub struct ElprisetJustNuClient {
    base_url: String,
    client: reqwest::Client,
}

impl ElprisetJustNuClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, PriceError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("energy-ledger/0.1"));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self { base_url, client })
    }

    fn url_for(&self, area: PriceArea, date: NaiveDate) -> String {
        format!(
            "{}/api/v1/prices/{:04}/{:02}-{:02}_{}.json",
            self.base_url.trim_end_matches('/'),
            date.year(),
            date.month(),
            date.day(),
            area
        )
    }
}

#[async_trait]
impl PriceSource for ElprisetJustNuClient {
    async fn fetch(&self, area: PriceArea, date: NaiveDate) -> Result<String, PriceError> {
        let url = self.url_for(area, date);
        debug!(%url, "fetching price list");
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(PriceError::Fetch(format!("{url} responded with HTTP {status}")));
        }
        Ok(body)
    }
}
