use events::{EventPublisher, StateEvent};
use log::*;
use sse::{Bus, SseStateEventHandler};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

mod controller;
mod error;
mod params;
mod router;

pub(crate) use error::Error;
pub use router::define_routes;

// Web-level state: the service state plus the live-update plumbing the
// controllers publish into.
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub service_state: service::AppState,
    pub sse_bus: Arc<Bus<StateEvent>>,
    pub event_publisher: EventPublisher,
    /// Cancelled on shutdown; every SSE session holds a child token.
    pub shutdown: CancellationToken,
    /// Held across store-then-publish so the last event displays receive
    /// matches what was stored last.
    pub update_lock: Arc<Mutex<()>>,
}

impl AppState {
    /// Wires the publisher so every state change lands on `sse_bus`.
    pub fn new(service_state: service::AppState, sse_bus: Arc<Bus<StateEvent>>) -> Self {
        let event_publisher = EventPublisher::new()
            .with_handler(Arc::new(SseStateEventHandler::new(Arc::clone(&sse_bus))));

        Self {
            service_state,
            sse_bus,
            event_publisher,
            shutdown: CancellationToken::new(),
            update_lock: Arc::new(Mutex::new(())),
        }
    }
}

pub async fn init_server(app_state: AppState) -> std::io::Result<()> {
    let listen_addr = app_state.service_state.config.listen_address();
    let shutdown = app_state.shutdown.clone();

    info!("Server starting... listening for connections on http://{listen_addr}");

    let listener = TcpListener::bind(&listen_addr).await?;
    let router = define_routes(app_state);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C (or when `shutdown` is cancelled elsewhere) and closes
/// every open SSE session so the graceful shutdown is not held up by them.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => {
                error!("Failed to listen for the shutdown signal: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {}
        _ = shutdown.cancelled() => {}
    }

    info!("Closing live event streams");
    shutdown.cancel();
}
