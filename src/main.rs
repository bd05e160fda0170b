//! BLE Lock Controller - Main Entry Point

use std::sync::Arc;

use ble_lock_controller::{
    SessionHandle,
    backend::BluerBackend,
    config::{CliArgs, Settings},
    core::authorization::AuthorizationService,
    transport::unix_socket::{BroadcastSink, RequestHandler, UnixSocketServer},
};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ble_lock_controller=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();
    info!(device = %args.device_name, adapter = ?args.adapter, "Starting BLE lock controller");
    let settings = Settings::from(args);

    let Some(secret) = settings.secret.as_deref() else {
        error!("Lock commands require --secret");
        return Err("Secret not provided".into());
    };
    let authorization = Arc::new(AuthorizationService::new(secret));

    let backend = Arc::new(BluerBackend::new(settings.adapter.as_deref()).await?);

    let notifications = BroadcastSink::new();
    let session = SessionHandle::spawn(
        backend,
        Arc::new(notifications.clone()),
        settings.session,
    );
    info!(config = ?settings.session, "Session task spawned");

    let handler = RequestHandler::new(
        session.clone(),
        authorization,
        settings.device_name.clone(),
    );
    let server = UnixSocketServer::new(
        settings.socket_path.clone(),
        settings.socket_mode,
        handler,
        notifications,
    );
    let listener = server.listen().await?;
    let server_task = tokio::spawn(async move {
        if let Err(e) = server.serve(listener).await {
            error!("Unix socket server error: {}", e);
        }
    });

    if settings.connect_on_start
        && let Err(e) = session.connect(settings.device_name.clone()).await
    {
        warn!("Initial connect failed: {}", e);
    }

    #[cfg(feature = "systemd")]
    if let Err(e) = sd_notify::notify(false, &[sd_notify::NotifyState::Ready]) {
        warn!("Failed to notify service manager: {}", e);
    }

    info!("Service started successfully");

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully");
        }
        _ = shutdown_signal() => {
            info!("Received SIGTERM, shutting down gracefully");
        }
        _ = server_task => {
            warn!("Unix socket server stopped");
        }
    }

    info!("Shutting down...");
    if let Err(e) = session.disconnect().await {
        warn!("Disconnect on shutdown failed: {}", e);
    }

    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            error!("Failed to register SIGTERM handler: {}", e);
            std::future::pending::<()>().await
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    // On non-Unix platforms, just wait forever
    std::future::pending::<()>().await
}
