//! Herald webhook delivery service.
//!
//! Main entry point for the Herald server. Loads configuration, starts the
//! dispatcher and the HTTP API, and drains in-flight deliveries on shutdown.

use std::sync::Arc;

use anyhow::{Context, Result};
use herald_api::{start_server, AppState, Config};
use herald_core::{Clock, RealClock};
use herald_delivery::{Dispatcher, EndpointRegistry};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    init_tracing(&config.rust_log)?;

    info!("Starting Herald webhook delivery service");

    let addr = config.parse_server_addr()?;
    info!(
        server_addr = %addr,
        queue_capacity = config.queue_capacity,
        max_attempts = config.max_attempts,
        delivery_timeout_seconds = config.delivery_timeout_seconds,
        "Configuration loaded"
    );

    let clock: Arc<dyn Clock> = Arc::new(RealClock::new());
    let registry = Arc::new(EndpointRegistry::new(clock.clone()));
    let dispatcher = Arc::new(
        Dispatcher::new(config.to_dispatcher_config(), registry, clock.clone())
            .context("failed to build dispatcher")?,
    );
    dispatcher.start().await.context("failed to start dispatcher")?;

    let state =
        AppState::new(dispatcher.clone(), clock).with_request_timeout(config.request_timeout());

    let served = start_server(state, addr).await;
    if let Err(e) = &served {
        error!(error = %e, "Server failed");
    }

    info!("Draining in-flight deliveries");
    if let Err(e) = dispatcher.shutdown().await {
        error!(error = %e, "Dispatcher did not drain before the shutdown timeout");
    }

    let stats = dispatcher.stats().await;
    info!(
        events_published = stats.events_published,
        deliveries_succeeded = stats.deliveries_succeeded,
        permanent_failures = stats.permanent_failures,
        deliveries_cancelled = stats.deliveries_cancelled,
        "Herald shutdown complete"
    );

    served.context("HTTP server failed")
}

/// Initializes tracing. `RUST_LOG` wins over the configured filter.
fn init_tracing(default_filter: &str) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .context("invalid log filter")?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
    Ok(())
}
