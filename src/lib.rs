pub mod api;
pub mod collector;
pub mod config;
pub mod database;
pub mod domain;
pub mod hardware;
pub mod prices;
pub mod telemetry;
