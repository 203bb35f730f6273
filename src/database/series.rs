//! Routing of series/partition pairs to physical tables
//!
//! Table names come only from the static registry below. Partition keys coming
//! from outside are parsed into a [`PriceArea`] first and rejected otherwise.

use std::fmt;
use std::str::FromStr;
use strum::IntoEnumIterator;

use super::QueryError;
use crate::domain::PriceArea;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeriesKind {
    /// Spot price per region, partitioned by [`PriceArea`].
    SekPerKwh,
    /// Household consumption in watts.
    Consumption,
    /// Local production in watts.
    Production,
}

impl fmt::Display for SeriesKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SekPerKwh => "sek_per_kwh",
            Self::Consumption => "consumption",
            Self::Production => "production",
        };
        f.write_str(s)
    }
}

/// A validated `(series, partition)` pair. Price series always carry their
/// area; the others are unpartitioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeriesKey {
    Prices(PriceArea),
    Consumption,
    Production,
}

impl SeriesKey {
    pub fn prices(area: PriceArea) -> Self {
        Self::Prices(area)
    }

    pub fn consumption() -> Self {
        Self::Consumption
    }

    pub fn production() -> Self {
        Self::Production
    }

    /// Validate an externally supplied partition key for `kind`.
    pub fn new(kind: SeriesKind, partition: Option<&str>) -> Result<Self, QueryError> {
        let area = partition
            .map(|p| {
                PriceArea::from_str(p).map_err(|_| QueryError::UnknownPartition(p.to_string()))
            })
            .transpose()?;
        match (kind, area) {
            (SeriesKind::SekPerKwh, Some(area)) => Ok(Self::Prices(area)),
            (SeriesKind::Consumption, None) => Ok(Self::Consumption),
            (SeriesKind::Production, None) => Ok(Self::Production),
            (kind, partition) => Err(QueryError::PartitionMismatch { kind, partition }),
        }
    }

    pub fn kind(&self) -> SeriesKind {
        match self {
            Self::Prices(_) => SeriesKind::SekPerKwh,
            Self::Consumption => SeriesKind::Consumption,
            Self::Production => SeriesKind::Production,
        }
    }

    pub fn area(&self) -> Option<PriceArea> {
        match self {
            Self::Prices(area) => Some(*area),
            _ => None,
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            Self::Prices(PriceArea::SE1) => "ts_sek_per_kwh_se1",
            Self::Prices(PriceArea::SE2) => "ts_sek_per_kwh_se2",
            Self::Prices(PriceArea::SE3) => "ts_sek_per_kwh_se3",
            Self::Prices(PriceArea::SE4) => "ts_sek_per_kwh_se4",
            Self::Consumption => "ts_consumption",
            Self::Production => "ts_production",
        }
    }

    /// Every valid key.
    pub fn all() -> impl Iterator<Item = SeriesKey> {
        PriceArea::iter()
            .map(Self::Prices)
            .chain([Self::Consumption, Self::Production])
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.area() {
            Some(area) => write!(f, "{}/{}", self.kind(), area),
            None => write!(f, "{}", self.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_registry_is_one_to_one() {
        let keys: Vec<_> = SeriesKey::all().collect();
        assert_eq!(keys.len(), 6);
        let tables: HashSet<_> = keys.iter().map(SeriesKey::table).collect();
        assert_eq!(tables.len(), keys.len());
    }

    #[test]
    fn test_new_validates_partition() {
        let key = SeriesKey::new(SeriesKind::SekPerKwh, Some("se4")).unwrap();
        assert_eq!(key, SeriesKey::prices(PriceArea::SE4));
        assert_eq!(key.table(), "ts_sek_per_kwh_se4");

        assert_eq!(
            SeriesKey::new(SeriesKind::Consumption, None).unwrap().table(),
            "ts_consumption"
        );
    }

    #[test]
    fn test_new_rejects_unknown_partition() {
        for bad in ["SE5", "", "se1; DROP TABLE ts_consumption", "se1 "] {
            assert!(
                matches!(
                    SeriesKey::new(SeriesKind::SekPerKwh, Some(bad)),
                    Err(QueryError::UnknownPartition(p)) if p == bad
                ),
                "{bad:?} accepted"
            );
        }
    }

    #[test]
    fn test_new_rejects_mismatched_partition() {
        assert!(matches!(
            SeriesKey::new(SeriesKind::SekPerKwh, None),
            Err(QueryError::PartitionMismatch { .. })
        ));
        assert!(matches!(
            SeriesKey::new(SeriesKind::Production, Some("SE3")),
            Err(QueryError::PartitionMismatch { .. })
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(SeriesKey::prices(PriceArea::SE1).to_string(), "sek_per_kwh/SE1");
        assert_eq!(SeriesKey::consumption().to_string(), "consumption");
    }
}
