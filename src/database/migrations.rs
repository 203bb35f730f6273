use super::migrator::Migration;

/// Schema history. Only ever append; the index of a step is its version.
pub const MIGRATIONS: &[Migration] = &[
    Migration::new(
        "create ts_sek_per_kwh_se3",
        "CREATE TABLE ts_sek_per_kwh_se3 (
            timestamp INTEGER PRIMARY KEY,
            value REAL NOT NULL
        ) STRICT",
    ),
    Migration::new(
        "create ts_sek_per_kwh_se1",
        "CREATE TABLE ts_sek_per_kwh_se1 (
            timestamp INTEGER PRIMARY KEY,
            value REAL NOT NULL
        ) STRICT",
    ),
    Migration::new(
        "create ts_sek_per_kwh_se2",
        "CREATE TABLE ts_sek_per_kwh_se2 (
            timestamp INTEGER PRIMARY KEY,
            value REAL NOT NULL
        ) STRICT",
    ),
    Migration::new(
        "create ts_sek_per_kwh_se4",
        "CREATE TABLE ts_sek_per_kwh_se4 (
            timestamp INTEGER PRIMARY KEY,
            value REAL NOT NULL
        ) STRICT",
    ),
    Migration::new(
        "create ts_consumption",
        "CREATE TABLE ts_consumption (
            timestamp INTEGER PRIMARY KEY,
            value REAL NOT NULL
        ) STRICT",
    ),
    Migration::new(
        "create ts_production",
        "CREATE TABLE ts_production (
            timestamp INTEGER PRIMARY KEY,
            value REAL NOT NULL
        ) STRICT",
    ),
];
