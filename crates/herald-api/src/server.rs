//! HTTP server configuration and request routing.
//!
//! Requests flow through middleware in order:
//! 1. Request ID propagation
//! 2. Request/response logging
//! 3. Timeout enforcement
//! 4. Handler execution
//!
//! # Graceful Shutdown
//!
//! On SIGTERM or CTRL+C the server stops accepting connections and waits for
//! in-flight requests. Draining the dispatcher is left to the caller.

use std::{future::Future, net::SocketAddr};

use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post, put},
    Router,
};
use http::HeaderValue;
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{handlers, AppState};

/// Header carrying the request correlation ID.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Creates the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use herald_api::{create_router, AppState};
/// use herald_core::{Clock, RealClock};
/// use herald_delivery::{Dispatcher, DispatcherConfig, EndpointRegistry};
///
/// let clock: Arc<dyn Clock> = Arc::new(RealClock::new());
/// let registry = Arc::new(EndpointRegistry::new(clock.clone()));
/// let dispatcher =
///     Arc::new(Dispatcher::new(DispatcherConfig::default(), registry, clock.clone()).unwrap());
/// let app = create_router(AppState::new(dispatcher, clock));
/// ```
pub fn create_router(state: AppState) -> Router {
    let endpoint_routes = Router::new()
        .route("/endpoints", post(handlers::create_endpoint).get(handlers::list_endpoints))
        .route("/endpoints/{id}", delete(handlers::delete_endpoint))
        .route("/endpoints/{id}/active", put(handlers::set_endpoint_active))
        .route("/endpoints/{id}/test", post(handlers::test_endpoint));

    let event_routes = Router::new()
        .route("/events", post(handlers::publish_event))
        .route("/events/{id}/deliveries", get(handlers::event_deliveries));

    let monitoring_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/dead-letters", get(handlers::list_dead_letters))
        .route("/stats", get(handlers::dispatch_stats));

    Router::new()
        .merge(monitoring_routes)
        .merge(endpoint_routes)
        .merge(event_routes)
        .layer(TimeoutLayer::new(state.request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(inject_request_id))
        .with_state(state)
}

/// Propagates the caller's `X-Request-Id`, or generates one, and echoes it
/// on the response.
async fn inject_request_id(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);

    req.extensions_mut().insert(request_id.clone());

    let mut response = next.run(req).await;

    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, header_value);
    }

    response
}

/// Serves the API on an already bound listener until `shutdown` resolves.
///
/// # Errors
///
/// Returns `std::io::Error` if the listener fails.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    info!(addr = %listener.local_addr()?, "HTTP server listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;

    info!("HTTP server stopped gracefully");
    Ok(())
}

/// Binds `addr` and serves until SIGTERM or CTRL+C.
///
/// # Errors
///
/// Returns `std::io::Error` if the port is in use or the listener fails.
pub async fn start_server(state: AppState, addr: SocketAddr) -> std::io::Result<()> {
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    serve(listener, state, shutdown_signal()).await
}

/// Waits for a shutdown signal (CTRL+C or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received CTRL+C, starting graceful shutdown");
        },
        () = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        },
    }

    warn!("Waiting for in-flight requests to complete");
}
