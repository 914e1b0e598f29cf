//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;

use super::GameServer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub server: Arc<GameServer>,
}

impl AppState {
    pub fn new(config: Config, server: Arc<GameServer>) -> Self {
        Self {
            config: Arc::new(config),
            server,
        }
    }
}
