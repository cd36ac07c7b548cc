pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod extract;
pub mod preferences;
pub mod programs;
pub mod search;
pub mod telemetry;

use std::sync::Arc;
use config::Config;

/// Application state shared across handlers. Read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        AppState {
            config: Arc::new(config),
        }
    }
}
