use clap::Parser; // for cli
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use docshrink::config::Args;
use docshrink::rate_limit::cleanup_task;
use docshrink::state::AppState;

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

// this is main async function with tokio
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("docshrink=info,tower_http=info")),
        )
        .init();

    // parse cli arguments
    let args = Args::parse();

    // creating shared state
    let state = Arc::new(AppState::from_args(&args, reqwest::Client::new()));

    // spawn the idle origin cleanup
    tokio::spawn(cleanup_task(
        Arc::clone(&state.rate_limiter),
        Duration::from_secs(args.rate_cleanup_interval.max(1)),
    ));

    let app = docshrink::app(Arc::clone(&state), &args);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(port = args.port, "docshrink listening");
    info!(
        daily_limit = args.daily_limit,
        rate_limit = args.rate_limit,
        rate_window_secs = args.rate_window,
        "quota policy"
    );
    info!(
        tools = ?args.tool_candidates(),
        timeout_secs = args.tool_timeout,
        temp_dir = %args.temp_dir().display(),
        "compression tools"
    );
    if !state.payments.is_configured() {
        tracing::warn!("payment provider not configured, upgrades disabled");
    }

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
