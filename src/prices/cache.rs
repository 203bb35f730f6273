//! Per-region caches of today's price list
//!
//! A cache holds one immutable [`TodaysPrices`] snapshot behind an `Arc`.
//! Refreshing fetches and parses outside any lock and then publishes the new
//! snapshot with a single pointer swap, so readers always see a complete list.
//! A failed refresh leaves the previous snapshot in place.

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::{parse_price_list, PriceError, PriceSource};
use crate::domain::{Price, PriceArea, TodaysPrices};

#[async_trait]
pub trait PriceCache: Send + Sync {
    fn area(&self) -> PriceArea;

    /// Shared handle to the currently published snapshot.
    fn snapshot(&self) -> Arc<TodaysPrices>;

    /// Replace the snapshot with the current day's list from the source.
    async fn update(&self) -> Result<(), PriceError>;

    /// Owned copy of the current snapshot.
    fn todays_prices(&self) -> TodaysPrices {
        self.snapshot().as_ref().clone()
    }

    fn expired_at(&self, now: DateTime<Utc>) -> bool {
        self.snapshot().is_expired(now)
    }

    fn expired(&self) -> bool {
        self.expired_at(Utc::now())
    }
}

#[derive(Debug, Default)]
struct Snapshot(RwLock<Arc<TodaysPrices>>);

impl Snapshot {
    fn new(today: TodaysPrices) -> Self {
        Self(RwLock::new(Arc::new(today)))
    }

    fn load(&self) -> Arc<TodaysPrices> {
        self.0.read().clone()
    }

    fn publish(&self, today: TodaysPrices) {
        let next = Arc::new(today);
        *self.0.write() = next;
    }
}

async fn fetch_today(
    source: &dyn PriceSource,
    area: PriceArea,
) -> Result<TodaysPrices, PriceError> {
    let date = Local::now().date_naive();
    let body = source.fetch(area, date).await?;
    parse_price_list(&body)
}

/// Memory-only cache; starts out expired.
pub struct MemPriceCache {
    area: PriceArea,
    source: Arc<dyn PriceSource>,
    snapshot: Snapshot,
}

impl MemPriceCache {
    pub fn new(area: PriceArea, source: Arc<dyn PriceSource>) -> Self {
        Self {
            area,
            source,
            snapshot: Snapshot::default(),
        }
    }
}

#[async_trait]
impl PriceCache for MemPriceCache {
    fn area(&self) -> PriceArea {
        self.area
    }

    fn snapshot(&self) -> Arc<TodaysPrices> {
        self.snapshot.load()
    }

    async fn update(&self) -> Result<(), PriceError> {
        let today = fetch_today(self.source.as_ref(), self.area).await?;
        info!(area = %self.area, mean_price = today.mean_price(), "price list updated");
        self.snapshot.publish(today);
        Ok(())
    }
}

/// Cache that also keeps the last good list in `<dir>/<AREA>_cache.json` so a
/// restart does not need to refetch.
pub struct FilePriceCache {
    area: PriceArea,
    source: Arc<dyn PriceSource>,
    path: PathBuf,
    snapshot: Snapshot,
}

impl FilePriceCache {
    /// Open the cache, loading the cache file if one exists. A missing file
    /// yields an expired cache.
    pub async fn open(
        area: PriceArea,
        source: Arc<dyn PriceSource>,
        dir: impl AsRef<Path>,
    ) -> Result<Self, PriceError> {
        let path = dir.as_ref().join(format!("{area}_cache.json"));
        let today = load(&path).await?;
        Ok(Self {
            area,
            source,
            path,
            snapshot: Snapshot::new(today),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, today: &TodaysPrices) -> Result<(), PriceError> {
        let persist_err =
            |e: std::io::Error| PriceError::Persist(format!("{}: {e}", self.path.display()));
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(persist_err)?;
        }
        let bytes =
            serde_json::to_vec(today.prices()).map_err(|e| PriceError::Persist(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await.map_err(persist_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(persist_err)?;
        debug!(path = %self.path.display(), "price list cache file written");
        Ok(())
    }
}

async fn load(path: &Path) -> Result<TodaysPrices, PriceError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no price list cache file");
            return Ok(TodaysPrices::default());
        }
        Err(e) => return Err(PriceError::Persist(format!("{}: {e}", path.display()))),
    };
    let prices: Vec<Price> = serde_json::from_slice(&bytes)
        .map_err(|e| PriceError::Persist(format!("{}: {e}", path.display())))?;
    Ok(TodaysPrices::new(prices))
}

#[async_trait]
impl PriceCache for FilePriceCache {
    fn area(&self) -> PriceArea {
        self.area
    }

    fn snapshot(&self) -> Arc<TodaysPrices> {
        self.snapshot.load()
    }

    async fn update(&self) -> Result<(), PriceError> {
        let today = fetch_today(self.source.as_ref(), self.area).await?;
        self.persist(&today).await?;
        info!(area = %self.area, mean_price = today.mean_price(), "price list updated");
        self.snapshot.publish(today);
        Ok(())
    }
}
