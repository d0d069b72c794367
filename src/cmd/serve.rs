//! `serve` subcommand: the composition root.
//!
//! Components are constructed in dependency order — settings, logger, routes,
//! server — and wired through constructors. The server's blocking `start()`
//! runs on a background task; the main task waits for a termination signal or
//! a start failure, then both paths converge on one bounded graceful stop.

use std::sync::Arc;
use std::time::Duration;

use clap::Args;

use crate::app;
use crate::cmd::Cli;
use crate::http::HttpServer;
use crate::observability::logging;
use crate::settings::Settings;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Args)]
pub struct ServeArgs {
    /// Environment to run the application
    #[arg(long)]
    pub env: Option<String>,

    /// Log level
    #[arg(long = "log-level")]
    pub log_level: Option<String>,
}

pub async fn run(cli: &Cli, args: &ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let settings = Arc::new(Settings::discover(cli.config.as_deref()));
    match settings.file_path() {
        Some(path) => eprintln!("using config file: {}", path.display()),
        None => eprintln!("no config file found, using defaults"),
    }

    settings.bind_flag(logging::ENV, args.env.as_deref(), "dev");
    settings.bind_flag(logging::LOG_LEVEL, args.log_level.as_deref(), "info");
    settings.bind_flag(logging::DEBUG, cli.debug.then_some(true), false);

    logging::init(&settings);

    let server = Arc::new(HttpServer::new(settings, app::routes()));

    let start_server = server.clone();
    let mut start_task = tokio::spawn(async move {
        if let Err(err) = start_server.start().await {
            tracing::error!(error = %err, "server failed to start");
        }
    });

    // Two triggers, one shutdown path: an OS termination signal or the
    // listener failing to start.
    tokio::select! {
        _ = shutdown_signal() => {}
        _ = &mut start_task => {}
    }

    if let Err(err) = server.stop(SHUTDOWN_TIMEOUT).await {
        tracing::error!(error = %err, "error during server shutdown");
    }
    if !start_task.is_finished() {
        let _ = start_task.await;
    }

    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
