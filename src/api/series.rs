//! Read-only series endpoints. `from`/`to` are epoch milliseconds.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use strum::IntoEnumIterator;

use super::ApiError;
use crate::{
    collector::AppState,
    database::{store::window_count, QueryError},
    domain::{watts_to_kw, Observation, PriceArea},
};

type Params<T> = Result<Query<T>, QueryRejection>;
type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize)]
pub struct AreaQuery {
    pub area_code: String,
}

#[derive(Debug, Deserialize)]
pub struct AreaRangeQuery {
    pub area_code: String,
    pub from: i64,
    pub to: i64,
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub from: i64,
    pub to: i64,
    #[serde(default)]
    pub unit: Unit,
}

/// Unit of the consumption endpoints. Samples are stored in watts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    #[default]
    W,
    Kw,
}

impl Unit {
    fn apply(self, obs: Observation) -> Observation {
        match self {
            Unit::W => obs,
            Unit::Kw => Observation::new(obs.timestamp, watts_to_kw(obs.value)),
        }
    }
}

fn parse_area(code: &str) -> Result<PriceArea, ApiError> {
    code.parse()
        .map_err(|_| QueryError::UnknownPartition(code.to_string()).into())
}

fn millis(name: &str, ms: i64) -> Result<DateTime<Utc>, ApiError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| ApiError::BadRequest(format!("{name}={ms} is out of range")))
}

fn range(from: i64, to: i64) -> Result<(DateTime<Utc>, DateTime<Utc>), ApiError> {
    Ok((millis("from", from)?, millis("to", to)?))
}

/// Like [`range`], also refusing ranges the hourly buckets cannot cover.
fn bucket_range(from: i64, to: i64) -> Result<(DateTime<Utc>, DateTime<Utc>), ApiError> {
    let (from, to) = range(from, to)?;
    window_count(from, to)?;
    Ok((from, to))
}

pub async fn healthz(State(st): State<AppState>) -> Result<StatusCode, ApiError> {
    st.store.health_check().await?;
    Ok(StatusCode::OK)
}

pub async fn area_codes() -> Json<Vec<PriceArea>> {
    Json(PriceArea::iter().collect())
}

/// Stored prices in range. The last price is repeated one second before its
/// hour ends so step charts draw the final hour.
pub async fn sek_per_kwh(
    State(st): State<AppState>,
    params: Params<AreaRangeQuery>,
) -> ApiResult<Vec<Observation>> {
    let Query(q) = params?;
    let area = parse_area(&q.area_code)?;
    let (from, to) = range(q.from, q.to)?;

    let mut prices = st.store.get_prices(area, from, to).await?;
    if let Some(last) = prices.last().copied() {
        let end = last.timestamp + Duration::hours(1) - Duration::seconds(1);
        prices.push(Observation::new(end, last.value));
    }
    Ok(Json(prices))
}

/// Latest stored price from the past hour, stamped with the current time.
pub async fn current_price(
    State(st): State<AppState>,
    params: Params<AreaQuery>,
) -> ApiResult<Observation> {
    let Query(q) = params?;
    let area = parse_area(&q.area_code)?;
    let now = Utc::now();

    let prices = st.store.get_prices(area, now - Duration::hours(1), now).await?;
    prices
        .last()
        .map(|p| Json(Observation::new(now, p.value)))
        .ok_or_else(|| ApiError::NotFound(format!("no current price for {area}")))
}

/// The cached mean price as a flat line over the cached day.
pub async fn current_mean_price(
    State(st): State<AppState>,
    params: Params<AreaQuery>,
) -> ApiResult<Vec<Observation>> {
    let Query(q) = params?;
    let area = parse_area(&q.area_code)?;
    let cache = st
        .cache(area)
        .ok_or_else(|| ApiError::NotFound(format!("no price cache for {area}")))?;

    let today = cache.snapshot();
    match (today.is_valid(), today.first(), today.last()) {
        (true, Some(first), Some(last)) => {
            let mean = today.mean_price();
            Ok(Json(vec![
                Observation::new(first.start.with_timezone(&Utc), mean),
                Observation::new(last.end.with_timezone(&Utc) - Duration::seconds(1), mean),
            ]))
        }
        _ => Err(ApiError::ServiceUnavailable(format!("no valid price list for {area}"))),
    }
}

pub async fn consumption(
    State(st): State<AppState>,
    params: Params<RangeQuery>,
) -> ApiResult<Vec<Observation>> {
    let Query(q) = params?;
    let (from, to) = range(q.from, q.to)?;
    let observations = st.store.get_consumption(from, to).await?;
    Ok(Json(observations.into_iter().map(|o| q.unit.apply(o)).collect()))
}

pub async fn consumption_buckets(
    State(st): State<AppState>,
    params: Params<RangeQuery>,
) -> ApiResult<Vec<Observation>> {
    let Query(q) = params?;
    let (from, to) = bucket_range(q.from, q.to)?;
    let buckets = st.store.bucketed_consumption(from, to).await?;
    Ok(Json(buckets.iter().map(|b| q.unit.apply(b.as_observation())).collect()))
}

pub async fn total_consumption(
    State(st): State<AppState>,
    params: Params<RangeQuery>,
) -> ApiResult<Observation> {
    let Query(q) = params?;
    let (from, to) = bucket_range(q.from, q.to)?;
    let total = st.store.total_consumption(from, to).await?;
    Ok(Json(q.unit.apply(Observation::new(Utc::now(), total))))
}
