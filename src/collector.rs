//! Background ingestion
//!
//! Two long-lived tasks feed the store: one refreshes expired price caches and
//! writes the new lists, the other polls the battery for a consumption sample.
//! Both stop when the shared [`CancellationToken`] is cancelled.

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use strum::IntoEnumIterator;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{CacheKind, Config};
use crate::database::{self, QueryError, TimeSeriesStore};
use crate::domain::{PriceArea, Stat};
use crate::hardware::{ConsumptionSource, EnergyError, SonnenBattery};
use crate::prices::{
    ElprisetJustNuClient, FilePriceCache, MemPriceCache, PriceCache, PriceError, PriceSource,
};

#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Price(#[from] PriceError),
    #[error(transparent)]
    Energy(#[from] EnergyError),
    #[error(transparent)]
    Store(#[from] QueryError),
}

/// Everything the collectors and the HTTP handlers share.
#[derive(Clone)]
pub struct AppState {
    pub cfg: Config,
    pub store: TimeSeriesStore,
    pub caches: Arc<Vec<Arc<dyn PriceCache>>>,
    pub battery: Arc<dyn ConsumptionSource>,
    /// Areas whose cache was refreshed but whose prices are not stored yet.
    unstored: Arc<Mutex<HashSet<PriceArea>>>,
}

impl AppState {
    /// Open the database and build one price cache per area plus the battery
    /// client from `cfg`.
    pub async fn new(cfg: Config) -> Result<Self> {
        let store = database::open(&cfg.db).await?;

        let source: Arc<dyn PriceSource> = Arc::new(ElprisetJustNuClient::new(
            cfg.prices.base_url.clone(),
            Duration::from_secs(cfg.prices.http_timeout_seconds),
        )?);
        let mut caches: Vec<Arc<dyn PriceCache>> = Vec::new();
        for area in PriceArea::iter() {
            let cache: Arc<dyn PriceCache> = match cfg.prices.cache {
                CacheKind::Memory => Arc::new(MemPriceCache::new(area, source.clone())),
                CacheKind::File => Arc::new(
                    FilePriceCache::open(area, source.clone(), &cfg.prices.cache_dir).await?,
                ),
            };
            caches.push(cache);
        }

        let battery = Arc::new(SonnenBattery::new(
            &cfg.battery.host,
            cfg.battery.port,
            cfg.battery.api_token.clone(),
            Duration::from_secs(cfg.battery.http_timeout_seconds),
        )?);

        Ok(Self::from_parts(cfg, store, caches, battery))
    }

    pub fn from_parts(
        cfg: Config,
        store: TimeSeriesStore,
        caches: Vec<Arc<dyn PriceCache>>,
        battery: Arc<dyn ConsumptionSource>,
    ) -> Self {
        Self {
            cfg,
            store,
            caches: Arc::new(caches),
            battery,
            unstored: Arc::default(),
        }
    }

    pub fn cache(&self, area: PriceArea) -> Option<&Arc<dyn PriceCache>> {
        self.caches.iter().find(|c| c.area() == area)
    }
}

/// Refresh and store every expired price list. Returns the areas whose prices
/// were stored; failures are logged and retried on the next run.
pub async fn refresh_prices_once(state: &AppState) -> Vec<PriceArea> {
    refresh_prices_at(state, Utc::now()).await
}

/// Like [`refresh_prices_once`] with an explicit clock. A list that was fetched
/// but failed to store is written again on the next run without refetching.
pub async fn refresh_prices_at(state: &AppState, now: DateTime<Utc>) -> Vec<PriceArea> {
    let mut refreshed = Vec::new();
    for cache in state.caches.iter() {
        let area = cache.area();
        if cache.expired_at(now) {
            if let Err(e) = cache.update().await {
                warn!(area = %area, error = %e, "price refresh failed");
                continue;
            }
            state.unstored.lock().insert(area);
        } else if !state.unstored.lock().contains(&area) {
            debug!(area = %area, "price list still valid");
            continue;
        }
        match store_prices(&state.store, cache.as_ref()).await {
            Ok(()) => {
                state.unstored.lock().remove(&area);
                refreshed.push(area);
            }
            Err(e) => warn!(area = %area, error = %e, "storing price list failed"),
        }
    }
    refreshed
}

async fn store_prices(store: &TimeSeriesStore, cache: &dyn PriceCache) -> Result<(), CollectError> {
    let observations = cache.snapshot().observations();
    store.put_prices(cache.area(), &observations).await?;
    Ok(())
}

/// Read one sample from the battery and store it.
pub async fn poll_energy_once(state: &AppState) -> Result<Stat, CollectError> {
    let stat = state.battery.stat().await?;
    state.store.put_stat(&stat).await?;
    debug!(
        consumption_w = stat.consumption_w,
        production_w = stat.production_w,
        "energy sample stored"
    );
    Ok(stat)
}

pub async fn price_collector(state: AppState, every: Duration, shutdown: CancellationToken) {
    info!(every_secs = every.as_secs(), "price collector started");
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let refreshed = refresh_prices_once(&state).await;
                if !refreshed.is_empty() {
                    info!(areas = ?refreshed, "price lists stored");
                }
            }
        }
    }
    info!("price collector stopped");
}

pub async fn energy_collector(state: AppState, every: Duration, shutdown: CancellationToken) {
    info!(every_secs = every.as_secs(), "energy collector started");
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = poll_energy_once(&state).await {
                    warn!(error = %e, "energy poll failed");
                }
            }
        }
    }
    info!("energy collector stopped");
}

pub fn spawn_collectors(state: AppState, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
    let prices_every = state.cfg.prices.refresh_interval();
    let energy_every = state.cfg.battery.poll_interval();
    vec![
        tokio::spawn(price_collector(state.clone(), prices_every, shutdown.clone())),
        tokio::spawn(energy_collector(state, energy_every, shutdown)),
    ]
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::domain::prices::fixtures::price_list_json;
    use crate::hardware::MockConsumptionSource;
    use crate::prices::MockPriceSource;
    use figment::{providers::{Format, Toml}, Figment};

    pub fn config() -> Config {
        let defaults = Toml::string(include_str!("../config/default.toml"));
        Config::from_figment(Figment::new().merge(defaults)).unwrap()
    }

    /// Source that serves a full day at `sek` for the areas in `ok` and fails
    /// for all others.
    pub fn prices_for(ok: &'static [PriceArea], sek: f64) -> Arc<dyn PriceSource> {
        let mut mock = MockPriceSource::new();
        mock.expect_fetch().returning(move |area, _| {
            if ok.contains(&area) {
                Ok(price_list_json(24, sek))
            } else {
                Err(PriceError::Fetch(format!("{area}: HTTP 503")))
            }
        });
        Arc::new(mock)
    }

    pub async fn state(
        source: Arc<dyn PriceSource>,
        battery: MockConsumptionSource,
    ) -> AppState {
        let store = database::in_memory().await.unwrap();
        let caches = PriceArea::iter()
            .map(|area| Arc::new(MemPriceCache::new(area, source.clone())) as Arc<dyn PriceCache>)
            .collect();
        AppState::from_parts(config(), store, caches, Arc::new(battery))
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{prices_for, state};
    use super::*;
    use crate::hardware::MockConsumptionSource;
    use chrono::{FixedOffset, TimeZone};

    fn all_time() -> (DateTime<Utc>, DateTime<Utc>) {
        (DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC)
    }

    #[tokio::test]
    async fn test_refresh_stores_refreshed_areas_only() {
        let state = state(prices_for(&[PriceArea::SE3], 0.8), MockConsumptionSource::new()).await;

        let refreshed = refresh_prices_once(&state).await;
        assert_eq!(refreshed, vec![PriceArea::SE3]);

        let (from, to) = all_time();
        let se3 = state.store.get_prices(PriceArea::SE3, from, to).await.unwrap();
        assert_eq!(se3.len(), 24);
        assert!(se3.iter().all(|o| o.value == 0.8));
        for area in [PriceArea::SE1, PriceArea::SE2, PriceArea::SE4] {
            assert!(state.store.get_prices(area, from, to).await.unwrap().is_empty());
            assert!(state.cache(area).unwrap().expired());
        }
    }

    #[tokio::test]
    async fn test_refresh_skips_valid_caches() {
        let state = state(prices_for(&[PriceArea::SE1], 1.0), MockConsumptionSource::new()).await;
        assert_eq!(refresh_prices_once(&state).await, vec![PriceArea::SE1]);

        // the fixture day lies in the past
        let cache = state.cache(PriceArea::SE1).unwrap();
        let during = cache.snapshot().first().unwrap().start.with_timezone(&Utc);
        assert!(refresh_prices_at(&state, during).await.is_empty());

        let after = cache.snapshot().last().unwrap().end.with_timezone(&Utc);
        assert_eq!(refresh_prices_at(&state, after).await, vec![PriceArea::SE1]);
    }

    #[tokio::test]
    async fn test_unstored_prices_are_written_on_next_run() {
        let state = state(prices_for(&[PriceArea::SE3], 1.5), MockConsumptionSource::new()).await;
        let pool = state.store.pool();
        sqlx::query("ALTER TABLE ts_sek_per_kwh_se3 RENAME TO hidden")
            .execute(pool)
            .await
            .unwrap();

        assert!(refresh_prices_once(&state).await.is_empty());
        let cache = state.cache(PriceArea::SE3).unwrap();
        assert!(cache.todays_prices().is_valid());

        sqlx::query("ALTER TABLE hidden RENAME TO ts_sek_per_kwh_se3")
            .execute(pool)
            .await
            .unwrap();
        // the cache is still valid here, only the write is retried
        let during = cache.snapshot().first().unwrap().start.with_timezone(&Utc);
        assert_eq!(refresh_prices_at(&state, during).await, vec![PriceArea::SE3]);
        let (from, to) = all_time();
        assert_eq!(state.store.get_prices(PriceArea::SE3, from, to).await.unwrap().len(), 24);

        assert!(refresh_prices_at(&state, during).await.is_empty());
    }

    #[tokio::test]
    async fn test_poll_energy_stores_both_series() {
        let stat = Stat {
            timestamp: FixedOffset::east_opt(3600)
                .unwrap()
                .with_ymd_and_hms(2024, 12, 26, 14, 38, 3)
                .unwrap(),
            consumption_w: 1234,
            production_w: 4321,
        };
        let mut battery = MockConsumptionSource::new();
        battery.expect_stat().times(1).returning(move || Ok(stat));
        let state = state(prices_for(&[], 0.0), battery).await;

        assert_eq!(poll_energy_once(&state).await.unwrap(), stat);
        let at = stat.timestamp.with_timezone(&Utc);
        assert_eq!(state.store.get_consumption(at, at).await.unwrap()[0].value, 1234.0);
        assert_eq!(state.store.get_production(at, at).await.unwrap()[0].value, 4321.0);
    }

    #[tokio::test]
    async fn test_poll_energy_failure_stores_nothing() {
        let mut battery = MockConsumptionSource::new();
        battery
            .expect_stat()
            .returning(|| Err(EnergyError::Status(reqwest::StatusCode::UNAUTHORIZED)));
        let state = state(prices_for(&[], 0.0), battery).await;

        assert!(matches!(poll_energy_once(&state).await, Err(CollectError::Energy(_))));
        let (from, to) = all_time();
        assert!(state.store.get_consumption(from, to).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_collectors_stop_on_cancel() {
        let mut battery = MockConsumptionSource::new();
        battery
            .expect_stat()
            .returning(|| Err(EnergyError::Status(reqwest::StatusCode::SERVICE_UNAVAILABLE)));
        let state = state(prices_for(&[PriceArea::SE4], 2.0), battery).await;
        let shutdown = CancellationToken::new();

        let handles = spawn_collectors(state.clone(), shutdown.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .expect("collector did not stop")
                .unwrap();
        }

        // The first tick fires immediately.
        let (from, to) = all_time();
        assert_eq!(state.store.get_prices(PriceArea::SE4, from, to).await.unwrap().len(), 24);
    }
}
