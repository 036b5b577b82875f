//! Rickybot server entry point.
//!
//! Binary name: `rickybot`
//!
//! Parses CLI arguments, loads configuration, wires the session registry,
//! notification broker, and agent, then serves the HTTP API until Ctrl+C or
//! SIGTERM.

mod cli;
mod http;
mod notification;
mod state;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use clap_complete::generate;

use rickybot_core::notify::NotificationBroker;
use rickybot_infra::config::load_config;
use rickybot_observe::tracing_setup::{filter_for_verbosity, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::{AppState, spawn_session_expiry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need logging or state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "rickybot", &mut std::io::stdout());
        return Ok(());
    }

    init_tracing(filter_for_verbosity(cli.verbose, cli.quiet), cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = match cli.command {
        Commands::Serve { host, port } => serve(&cli.config, host, port).await,
        Commands::Completions { .. } => Ok(()),
    };

    shutdown_tracing();
    result
}

async fn serve(
    config_path: &std::path::Path,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let mut config = load_config(config_path).await;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    tracing::debug!(?config, "Configuration resolved");

    let state = AppState::init(&config)?;
    let registry = Arc::clone(&state.registry);
    let broker = Arc::clone(&state.broker);
    let expiry_cancel = tokio_util::sync::CancellationToken::new();
    let expiry = spawn_session_expiry(
        Arc::clone(&registry),
        Duration::from_secs(config.session.idle_timeout_secs),
        Duration::from_secs(config.session.sweep_interval_secs),
        expiry_cancel.clone(),
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!(
        "  {} Rickybot listening on {}",
        console::style("⚡").bold(),
        console::style(format!("http://{addr}")).cyan()
    );
    println!("  {}", console::style("Press Ctrl+C to stop").dim());
    tracing::info!(%addr, model = %config.agent.model, "Server started");

    let router = http::router::build_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown(broker))
        .await?;

    expiry_cancel.cancel();
    if let Some(expiry) = expiry {
        let _ = expiry.await;
    }
    registry.shutdown();
    tracing::info!("Server stopped");
    println!("\n  Server stopped.");
    Ok(())
}

/// Wait for a shutdown signal, then close live connections with "going away".
async fn shutdown(broker: Arc<NotificationBroker>) {
    shutdown_signal().await;
    tracing::info!("Shutdown signal received");
    broker.shutdown();
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
