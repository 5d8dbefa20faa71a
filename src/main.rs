use log::{error, info};
use service::{config::Config, logging::Logger, AppState};

#[tokio::main]
async fn main() {
    let config = Config::new();
    Logger::init_logger(&config as &Config);

    info!(
        "Starting SSE broker (buffer size {}, gzip {}, CORS {})",
        config.buffer_size,
        if config.gzip { "on" } else { "off" },
        if config.allow_cors { "on" } else { "off" }
    );

    let app_state = AppState::new(config).await;

    if let Err(e) = web::init_server(app_state).await {
        error!("Server stopped: {e}");
        std::process::exit(1);
    }
}
