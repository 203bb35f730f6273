pub mod error;
pub mod series;

use axum::{routing::get, Router};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::{collector::AppState, config::Config};

pub use error::ApiError;

pub fn router(state: AppState, cfg: &Config) -> Router {
    Router::new()
        .route("/healthz", get(series::healthz))
        .route("/area_codes", get(series::area_codes))
        .route("/ts_sek_per_kwh", get(series::sek_per_kwh))
        .route("/current_price", get(series::current_price))
        .route("/ts_current_mean_price", get(series::current_mean_price))
        .route("/ts_consumption", get(series::consumption))
        .route("/ts_consumption_buckets", get(series::consumption_buckets))
        .route("/total_consumption", get(series::total_consumption))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(cfg.server.request_timeout_secs))),
        )
}
