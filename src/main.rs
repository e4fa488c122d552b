use std::net::SocketAddr;

use extra_seguro_backend::configuration::BackendConfiguration;
use extra_seguro_backend::error::ContextError;
use extra_seguro_backend::server::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<(), ContextError> {
    env_logger::init();

    let configuration = BackendConfiguration::from_environment()?;
    let port = configuration.port;
    let application = build_router(AppState::new(configuration));

    let address = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| {
            ContextError::with_error(format!("Unable to bind to the address {}", address), &error)
        })?;

    log::info!("🚀 Backend listo puerto {}", port);
    axum::serve(listener, application)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|error| ContextError::with_error("Server error", &error))?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {}
            Err(error) => log::error!("Failed to install the Ctrl+C handler: {}", error),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => log::error!("Failed to install the termination handler: {}", error),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
