//! HTTP layer of the broker: event streams, the publish API and the
//! hold-capable reverse proxy, served with axum.

use log::*;
use tokio::net::TcpListener;

pub(crate) use service::AppState;

pub mod error;
pub mod proxy;
pub mod sse;

mod controller;
mod params;
mod router;

pub use error::{Error, Result};
pub use router::define_routes;
pub use self::sse::handler::{channel_handler, channel_handler_with_initial_event, InitialEvent};

/// Binds the configured address and serves until interrupted.
pub async fn init_server(app_state: AppState) -> Result<()> {
    let listen_addr = app_state.config.listen_address();
    let listener = TcpListener::bind(listen_addr.as_str()).await.inspect_err(|e| {
        error!("Failed to bind {listen_addr}: {e}");
    })?;
    info!("Server starting... listening for connections on http://{listen_addr}");

    serve(listener, app_state, shutdown_signal()).await
}

/// Serves on an already bound listener until `signal` resolves, then shuts
/// the broker down so held streams end and the server can drain.
pub async fn serve<F>(listener: TcpListener, app_state: AppState, signal: F) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let router = define_routes(app_state.clone())?;
    let broker = app_state.broker.clone();

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            signal.await;
            info!("Shutting down, closing all event streams");
            broker.shutdown().await;
        })
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for the shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
