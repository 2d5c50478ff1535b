use config::Config;
use log::info;
use state_store::StateStore;
use std::sync::Arc;
use std::time::Instant;

pub mod config;
pub mod error;
pub mod logging;
pub mod state_store;

/// Load the dashboard state file named by the config.
pub async fn init_state_store(config: &Config) -> StateStore {
    info!("Loading dashboard state from {}", config.state_file().display());
    StateStore::load(config.state_file()).await
}

// Service-level state containing only infrastructure concerns
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub state_store: Arc<StateStore>,
    pub config: Config,
    started_at: Instant,
}

impl AppState {
    pub fn new(app_config: Config, state_store: &Arc<StateStore>) -> Self {
        Self {
            state_store: Arc::clone(state_store),
            config: app_config,
            started_at: Instant::now(),
        }
    }

    pub fn state_store_ref(&self) -> &StateStore {
        self.state_store.as_ref()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
