use std::sync::Arc;

use log::{error, info, warn};

use hyyperwan::capture_management::{CaptureManager, ScratchDir, SessionStore, TcpdumpEngine};
use hyyperwan::configuration::Config;
use hyyperwan::network_control::{HostEnvironment, NetworkController, SystemRunner};
use hyyperwan::web_interface::{AppState, WebServer};

#[tokio::main]
async fn main() {
    let config = match Config::from_args() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = config.init_logger() {
        eprintln!("Unable to initialize logging: {}", e);
        std::process::exit(1);
    }

    info!("Starting hyyperwan v{}", env!("CARGO_PKG_VERSION"));

    let host = HostEnvironment::detect();
    if host.in_container {
        info!("Running inside a container");
    }

    let labels = match config.labels() {
        Ok(labels) => Arc::new(labels),
        Err(e) => {
            error!("Unable to load interface labels: {}", e);
            std::process::exit(1);
        }
    };

    let captures = match CaptureManager::new(
        Arc::new(TcpdumpEngine::new(config.use_sudo())),
        Arc::new(SessionStore::new()),
        ScratchDir::new(&config.scratch_dir),
        labels.clone(),
        host.clone(),
        config.cleanup_delay(),
    ) {
        Ok(manager) => Arc::new(manager),
        Err(e) => {
            error!("Unable to create the capture manager: {}", e);
            std::process::exit(1);
        }
    };

    let network = match NetworkController::new(
        Arc::new(SystemRunner),
        labels,
        host,
        config.use_sudo(),
    ) {
        Ok(controller) => Arc::new(controller),
        Err(e) => {
            error!("Unable to create the network controller: {}", e);
            std::process::exit(1);
        }
    };

    let state = Arc::new(AppState {
        captures: Arc::clone(&captures),
        network,
        tools_column_disabled: config.disable_tools_column,
    });

    WebServer::new(state, config.socket_addr())
        .run(shutdown_signal())
        .await;

    captures.shutdown();
    info!("Shutdown complete");
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                warn!("Unable to listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl+C");
    }
}
