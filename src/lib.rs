//! Document compression service with per-user daily quotas, per-origin
//! rate limiting and payment-verified lifetime upgrades.

pub mod config;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod ledger;
pub mod metrics;
pub mod models;
pub mod payment;
pub mod profile;
pub mod rate_limit;
pub mod state;
pub mod tool;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderName, HeaderValue, Method, header},
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use config::Args;
use handlers::{
    compress_handler, create_order_handler, health_handler, metrics_handler, usage_handler,
    verify_payment_handler,
};
use state::AppState;

// Compression metadata the browser client reads back
const EXPOSED_HEADERS: [&str; 7] = [
    "x-remaining-compressions",
    "x-is-pro",
    "x-original-size",
    "x-compressed-size",
    "x-reduction-percent",
    "x-co2-saved-grams",
    "x-compression-path",
];

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o.trim()) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .expose_headers(EXPOSED_HEADERS.map(HeaderName::from_static))
}

/// Build the application router.
pub fn app(state: Arc<AppState>, args: &Args) -> Router {
    let api = Router::new()
        .route("/usage", get(usage_handler))
        .route(
            "/compress",
            post(compress_handler).layer(DefaultBodyLimit::max(args.max_upload_bytes())),
        )
        .route("/payment/create-order", post(create_order_handler))
        .route("/payment/verify", post(verify_payment_handler));

    Router::new()
        .nest("/api", api)
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(cors_layer(&args.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
