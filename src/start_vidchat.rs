//! Startup helpers for the vidchat server.

use std::process::ExitCode;
use std::sync::Arc;

use crate::chat::{ChatService, ServiceBackends, build_backend};
use crate::config::AppConfig;
use crate::server::{self, AppState};
use crate::transcript::YoutubeClient;

/// Run the server until Ctrl-C (used by the `vidchat-server` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting vidchat v{}", env!("CARGO_PKG_VERSION"));

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            return ExitCode::from(1);
        }
    };

    let state = match initialize(&config) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to create state: {e}");
            return ExitCode::from(1);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {e}");
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown signal received");
    };

    if let Err(e) = rt.block_on(server::run_server_with_shutdown(
        state,
        config.server.port,
        shutdown,
    )) {
        tracing::error!("Server error: {e}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

/// Build the application state from configuration without starting the server.
///
/// # Errors
/// Returns an error if a backend, provider or the chat service cannot be created.
pub fn initialize(
    config: &AppConfig,
) -> Result<Arc<AppState>, Box<dyn std::error::Error + Send + Sync>> {
    let chat = build_backend(&config.chat)?;
    let youtube = Arc::new(YoutubeClient::new(&config.youtube)?);
    if config.youtube.api_key.is_none() {
        tracing::warn!("YOUTUBE_API_KEY not set, video info requests will fail");
    }

    let service = ChatService::new(
        &config.chat,
        ServiceBackends {
            chat,
            transcripts: youtube.clone(),
            metadata: youtube,
        },
    )?;

    Ok(AppState::new(service, config.chat.model.clone()))
}
