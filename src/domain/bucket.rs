use chrono::{DateTime, Duration, Utc};

use super::types::Observation;

/// Fixed-width aggregation window `[begin, end)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub observations: Vec<Observation>,
}

impl Bucket {
    pub fn width(&self) -> Duration {
        self.end - self.begin
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.begin && instant < self.end
    }

    /// Mean of the contained values, `0.0` for an empty bucket.
    pub fn representative_value(&self) -> f64 {
        if self.observations.is_empty() {
            return 0.0;
        }
        let total: f64 = self.observations.iter().map(|o| o.value).sum();
        total / self.observations.len() as f64
    }

    pub fn as_observation(&self) -> Observation {
        Observation::new(self.begin, self.representative_value())
    }
}

/// Collect the observations that fall inside `[begin, begin + width)`.
///
/// A window reaching past the last representable instant ends there.
pub fn bucket(
    begin: DateTime<Utc>,
    width: Duration,
    observations: impl IntoIterator<Item = Observation>,
) -> Bucket {
    let end = begin.checked_add_signed(width).unwrap_or(DateTime::<Utc>::MAX_UTC);
    Bucket {
        begin,
        end,
        observations: observations
            .into_iter()
            .filter(|o| o.timestamp >= begin && o.timestamp < end)
            .collect(),
    }
}

/// Sum of the representative value of every bucket.
///
/// This adds per-window means, it does not weight by sample count or window
/// length.
pub fn aggregate_total(buckets: &[Bucket]) -> f64 {
    buckets.iter().map(Bucket::representative_value).sum()
}

/// Window start instants `from, from + width, ...` strictly before `to`.
/// Iteration stops early if the next start is not representable.
pub fn windows(
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    width: Duration,
) -> impl Iterator<Item = DateTime<Utc>> {
    let step = if width > Duration::zero() { width } else { Duration::hours(1) };
    std::iter::successors(Some(from), move |b| b.checked_add_signed(step))
        .take_while(move |b| *b < to)
}

/// [`windows`] one hour wide.
pub fn hourly_windows(
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> impl Iterator<Item = DateTime<Utc>> {
    windows(from, to, Duration::hours(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 12, 26, h, m, 0).unwrap()
    }

    #[test]
    fn test_empty_bucket_is_zero() {
        let b = bucket(at(10, 0), Duration::hours(1), Vec::new());
        assert_eq!(b.representative_value(), 0.0);
        assert!(!b.representative_value().is_nan());
        assert_eq!(b.as_observation(), Observation::new(at(10, 0), 0.0));
    }

    #[test]
    fn test_mean_of_observations() {
        let obs = vec![
            Observation::new(at(10, 0), 2.0),
            Observation::new(at(10, 20), 4.0),
            Observation::new(at(10, 40), 6.0),
        ];
        let b = bucket(at(10, 0), Duration::hours(1), obs);
        assert_eq!(b.observations.len(), 3);
        assert_eq!(b.representative_value(), 4.0);
        assert_eq!(b.as_observation().timestamp, at(10, 0));
    }

    #[test]
    fn test_negative_values_are_averaged() {
        let obs = vec![
            Observation::new(at(10, 0), -2.0),
            Observation::new(at(10, 30), -4.0),
        ];
        assert_eq!(bucket(at(10, 0), Duration::hours(1), obs).representative_value(), -3.0);
    }

    #[test]
    fn test_window_is_half_open() {
        let obs = vec![
            Observation::new(at(9, 59), 100.0),
            Observation::new(at(10, 0), 1.0),
            Observation::new(at(11, 0), 100.0),
        ];
        let b = bucket(at(10, 0), Duration::hours(1), obs);
        assert_eq!(b.observations, vec![Observation::new(at(10, 0), 1.0)]);
        assert_eq!(b.width(), Duration::hours(1));
    }

    #[test]
    fn test_aggregate_total_sums_means() {
        let buckets = vec![
            bucket(
                at(0, 0),
                Duration::hours(1),
                vec![Observation::new(at(0, 0), 1.0), Observation::new(at(0, 30), 3.0)],
            ),
            bucket(at(1, 0), Duration::hours(1), vec![Observation::new(at(1, 10), 10.0)]),
            bucket(at(2, 0), Duration::hours(1), Vec::new()),
        ];
        // 2.0 + 10.0 + 0.0, not the raw sum 14.0
        assert_eq!(aggregate_total(&buckets), 12.0);
        assert_eq!(aggregate_total(&[]), 0.0);
    }

    #[test]
    fn test_windows() {
        let begins: Vec<_> = windows(at(0, 0), at(3, 0), Duration::hours(1)).collect();
        assert_eq!(begins, vec![at(0, 0), at(1, 0), at(2, 0)]);

        let partial: Vec<_> = windows(at(0, 0), at(1, 30), Duration::hours(1)).collect();
        assert_eq!(partial, vec![at(0, 0), at(1, 0)]);

        assert_eq!(windows(at(3, 0), at(1, 0), Duration::hours(1)).count(), 0);
        assert_eq!(hourly_windows(at(0, 0), at(3, 0)).collect::<Vec<_>>(), begins);
    }

    #[test]
    fn test_windows_near_end_of_time() {
        let max = DateTime::<Utc>::MAX_UTC;
        let begins: Vec<_> =
            windows(max - Duration::minutes(90), max, Duration::hours(1)).collect();
        assert_eq!(begins, vec![max - Duration::minutes(90), max - Duration::minutes(30)]);

        let last = bucket(
            max - Duration::minutes(30),
            Duration::hours(1),
            vec![Observation::new(max - Duration::minutes(1), 5.0)],
        );
        assert_eq!(last.end, max);
        assert_eq!(last.representative_value(), 5.0);
    }
}
