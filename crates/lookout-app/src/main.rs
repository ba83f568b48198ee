//! Lookout application binary - composition root.
//!
//! 1. Resolve configuration (CLI > env > TOML file > defaults); a config
//!    file that exists but does not parse is fatal
//! 2. Load and validate the feed table and parameter sets (fatal on error)
//! 3. Build the model client, tool registry and orchestrator
//! 4. Start the session purge loop
//! 5. Serve the REST API until Ctrl-C

mod cli;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use lookout_api::{start_server, AppState};
use lookout_chat::{Orchestrator, OpenAiClient, RetryPolicy, ToolRegistry};
use lookout_core::LookoutConfig;
use lookout_data::load_dataset;

use crate::cli::CliArgs;

/// Periodically drop sessions idle past their timeout.
async fn session_purge_loop(orchestrator: Arc<Orchestrator>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    // The first tick fires immediately.
    interval.tick().await;

    loop {
        interval.tick().await;
        let purged = orchestrator.purge_expired();
        if purged > 0 {
            tracing::info!(purged, remaining = orchestrator.session_count(), "Expired sessions purged");
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    let config_path = args.resolve_config_path();
    // Tracing is not up yet; a bad config file ends startup with the error on stderr.
    let mut config = LookoutConfig::load_or_default(&config_path).map_err(|e| {
        eprintln!("Failed to load config from {}: {}", config_path.display(), e);
        e
    })?;
    args.apply(&mut config);

    // RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::info!("Starting Lookout v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_path.display(), "Configuration resolved");

    // Dataset.
    let dataset = match load_dataset(&config.data) {
        Ok(dataset) => Arc::new(dataset),
        Err(e) => {
            tracing::error!(error = %e, data_dir = %config.data.data_dir, "Failed to load dataset");
            return Err(e.into());
        }
    };

    // Model client.
    let client = OpenAiClient::new(config.llm.clone())?;
    if !config.llm.enabled {
        tracing::warn!("LLM disabled in config; every question gets a degraded answer");
    } else if !client.has_api_key() {
        tracing::warn!(
            env = %config.llm.api_key_env,
            "No API key found; questions will fail until it is set"
        );
    } else {
        tracing::info!(model = %config.llm.model, endpoint = %config.llm.endpoint, "LLM client ready");
    }

    let orchestrator = Orchestrator::new(
        Arc::new(client),
        ToolRegistry::with_dataset(Arc::clone(&dataset)),
        config.chat.clone(),
        RetryPolicy::from(&config.llm),
        &dataset.feeds().column_names(),
    );
    tracing::info!(tools = orchestrator.tools().len(), "Orchestrator ready");

    let state = AppState::new(config.clone(), Arc::clone(&dataset), orchestrator);

    // === Background tasks ===

    let purge_orchestrator = Arc::clone(&state.orchestrator);
    let purge_interval = config.chat.purge_interval_secs;
    tokio::spawn(async move {
        session_purge_loop(purge_orchestrator, purge_interval).await;
    });

    // === API server ===

    if let Err(e) = start_server(&config, state, shutdown_signal()).await {
        tracing::error!(error = %e, "API server failed");
        return Err(e.into());
    }

    Ok(())
}
