//! # edgeplane Agent Daemon
//!
//! Runs the device agent until SIGINT or SIGTERM.
//!
//! ## Startup
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Daemon Startup                                 │
//! │                                                                         │
//! │  1. Load AgentConfig   (argv[1] | $EDGEPLANE_CONFIG | default path)    │
//! │  2. Init tracing       (RUST_LOG, else [log].level)                    │
//! │  3. Build collaborators around one HttpControlPlane                    │
//! │  4. Agent::run_until(shutdown_signal)                                  │
//! │       registration failure ──► exit non-zero, loops never start        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use edgeplane_agent::{
    AgentBuilder, AgentConfig, DesiredStateSupervisor, HostInfoReporter, HttpControlPlane,
    TunnelConfig, TunnelConnector, TunnelFrame,
};
use edgeplane_core::AGENT_VERSION;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = AgentConfig::load(config_path).context("Failed to load agent configuration")?;

    init_tracing(&config.log.level);
    info!(
        version = AGENT_VERSION,
        project_id = %config.project_id(),
        state_dir = %config.state_dir().display(),
        controller = %config.controller.url,
        "Starting edgeplane agent"
    );

    let client = Arc::new(
        HttpControlPlane::new(&config.controller, config.project_id())
            .context("Failed to create control plane client")?,
    );

    let supervisor = Arc::new(DesiredStateSupervisor::new(client.clone()));

    let (connector, mut frames) = TunnelConnector::new(
        client.clone(),
        TunnelConfig {
            connect_timeout: config.controller.connect_timeout(),
            ..Default::default()
        },
    );
    tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            match frame {
                TunnelFrame::Text(text) => debug!(len = text.len(), "Tunnel text frame"),
                TunnelFrame::Binary(data) => debug!(len = data.len(), "Tunnel binary frame"),
            }
        }
    });

    let info_reporter = Arc::new(HostInfoReporter::new(client.clone(), client.base_url().clone()));

    let agent = AgentBuilder::new(config)
        .with_registrar(client.clone())
        .with_bundle_source(client.clone())
        .with_supervisor(supervisor)
        .with_connector(Arc::new(connector))
        .with_info_reporter(info_reporter)
        .build()
        .context("Failed to build agent")?;

    if let Err(e) = agent.run_until(shutdown_signal()).await {
        error!(error = %e, fatal = e.is_fatal(), "Agent failed to start");
        return Err(e).context("Agent initialization failed");
    }

    info!("Agent shutdown complete");
    Ok(())
}

/// Installs the global subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(?e, "Failed to listen for Ctrl+C");
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
                warn!(?e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received, stopping agent...");
}
