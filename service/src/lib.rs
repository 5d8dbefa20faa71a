use config::Config;
use log::info;
use sse::{Broker, History};
use std::sync::Arc;

pub mod config;
pub mod logging;

// Service-level state shared by every request handler.
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub broker: Broker,
    pub history: Arc<History>,
    pub config: Config,
}

impl AppState {
    /// Starts the broker and binds the in-memory history as the default
    /// repository, so every channel can replay what it has published.
    pub async fn new(app_config: Config) -> Self {
        let broker = Broker::new(app_config.broker_config());
        let history = Arc::new(History::new(app_config.history_capacity));
        broker.register_default_repository(history.clone()).await;

        info!(
            "Retaining up to {} event(s) per channel for replay",
            app_config.history_capacity
        );

        Self {
            broker,
            history,
            config: app_config,
        }
    }
}
