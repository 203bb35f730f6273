use chrono::{DateTime, Duration, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::{QueryError, SeriesKey};
use crate::domain::{aggregate_total, bucket, hourly_windows, Bucket, Observation, PriceArea, Stat};

/// Most windows a single bucketed query may span (31 days of hours).
pub const MAX_BUCKETS: i64 = 24 * 31;

/// Width of the windows used by the bucketed consumption queries.
pub fn bucket_width() -> Duration {
    Duration::hours(1)
}

/// Number of hourly windows starting in `[from, to)`.
///
/// Fails when that is more than [`MAX_BUCKETS`] or when the last window would
/// end past the representable time range.
pub fn window_count(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<i64, QueryError> {
    if to <= from {
        return Ok(0);
    }
    let width_ms = bucket_width().num_milliseconds();
    let span_ms = (to - from).num_milliseconds();
    let count = (span_ms + width_ms - 1) / width_ms;
    if count > MAX_BUCKETS {
        return Err(QueryError::InvalidRange(format!(
            "{count} hourly windows requested, at most {MAX_BUCKETS} allowed"
        )));
    }
    Duration::try_milliseconds(count * width_ms)
        .and_then(|span| from.checked_add_signed(span))
        .ok_or_else(|| QueryError::InvalidRange(format!("windows from {from} overflow")))?;
    Ok(count)
}

/// Time-series storage, one table per series key.
#[derive(Debug, Clone)]
pub struct TimeSeriesStore {
    pool: SqlitePool,
}

impl TimeSeriesStore {
    /// Wrap an already migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<(), QueryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Upsert all observations in one transaction.
    pub async fn put(
        &self,
        key: SeriesKey,
        observations: &[Observation],
    ) -> Result<(), QueryError> {
        if observations.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        upsert(&mut tx, key, observations).await?;
        tx.commit().await?;
        debug!(series = %key, rows = observations.len(), "observations stored");
        Ok(())
    }

    /// Observations with `from <= timestamp <= to`, oldest first.
    pub async fn get(
        &self,
        key: SeriesKey,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Observation>, QueryError> {
        let sql = format!(
            "SELECT timestamp, value FROM {} WHERE timestamp BETWEEN ?1 AND ?2 ORDER BY timestamp",
            key.table()
        );
        let rows: Vec<(i64, f64)> = sqlx::query_as(&sql)
            .bind(from.timestamp())
            .bind(to.timestamp())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|(ts, value)| Ok(Observation::new(from_epoch(ts)?, value)))
            .collect()
    }

    pub async fn put_prices(
        &self,
        area: PriceArea,
        observations: &[Observation],
    ) -> Result<(), QueryError> {
        self.put(SeriesKey::prices(area), observations).await
    }

    pub async fn get_prices(
        &self,
        area: PriceArea,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Observation>, QueryError> {
        self.get(SeriesKey::prices(area), from, to).await
    }

    pub async fn put_consumption(&self, observation: Observation) -> Result<(), QueryError> {
        self.put(SeriesKey::consumption(), &[observation]).await
    }

    pub async fn get_consumption(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Observation>, QueryError> {
        self.get(SeriesKey::consumption(), from, to).await
    }

    pub async fn get_production(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Observation>, QueryError> {
        self.get(SeriesKey::production(), from, to).await
    }

    /// Store consumption and production of one battery sample together.
    pub async fn put_stat(&self, stat: &Stat) -> Result<(), QueryError> {
        let mut tx = self.pool.begin().await?;
        upsert(&mut tx, SeriesKey::consumption(), &[stat.consumption()]).await?;
        upsert(&mut tx, SeriesKey::production(), &[stat.production()]).await?;
        tx.commit().await?;
        Ok(())
    }

    /// One hourly bucket per window start in `[from, to)`.
    ///
    /// Each window is loaded with its own closed-range query and then trimmed
    /// to `[begin, begin + 1h)`, so a sample on a boundary counts once.
    pub async fn bucketed_consumption(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Bucket>, QueryError> {
        let width = bucket_width();
        let mut buckets = Vec::with_capacity(window_count(from, to)? as usize);
        for begin in hourly_windows(from, to) {
            let end = begin.checked_add_signed(width).unwrap_or(DateTime::<Utc>::MAX_UTC);
            let observations = self.get_consumption(begin, end).await?;
            buckets.push(bucket(begin, width, observations));
        }
        Ok(buckets)
    }

    /// Sum of the hourly bucket means over `[from, to)`.
    pub async fn total_consumption(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<f64, QueryError> {
        let buckets = self.bucketed_consumption(from, to).await?;
        Ok(aggregate_total(&buckets))
    }
}

async fn upsert(
    conn: &mut SqliteConnection,
    key: SeriesKey,
    observations: &[Observation],
) -> Result<(), QueryError> {
    let sql = format!(
        "INSERT INTO {} (timestamp, value) VALUES (?1, ?2)
         ON CONFLICT (timestamp) DO UPDATE SET value = excluded.value",
        key.table()
    );
    for obs in observations {
        sqlx::query(&sql)
            .bind(obs.timestamp.timestamp())
            .bind(obs.value)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

fn from_epoch(ts: i64) -> Result<DateTime<Utc>, QueryError> {
    DateTime::from_timestamp(ts, 0).ok_or_else(|| {
        QueryError::Database(sqlx::Error::Decode(
            format!("timestamp {ts} out of range").into(),
        ))
    })
}
