use events::StateEvent;
use log::*;
use service::{config::Config, init_state_store, logging::Logger};
use sse::Bus;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let config = Config::new();
    Logger::init_logger(&config);

    info!("Starting up broadcast panel...");

    if config.keepalive_interval() >= config.watchdog_timeout() {
        warn!(
            "SSE keepalive interval ({:?}) is not shorter than the watchdog timeout ({:?}); idle displays will be dropped",
            config.keepalive_interval(),
            config.watchdog_timeout()
        );
    }

    let state_store = Arc::new(init_state_store(&config).await);
    let sse_bus: Arc<Bus<StateEvent>> = Arc::new(Bus::new(config.sse_replay_capacity));
    debug!(
        "SSE bus ready (replay capacity {})",
        sse_bus.replay_capacity()
    );

    let service_state = service::AppState::new(config, &state_store);
    let app_state = web::AppState::new(service_state, sse_bus);

    if let Err(e) = web::init_server(app_state).await {
        error!("Server failed: {e}");
        std::process::exit(1);
    }
}
