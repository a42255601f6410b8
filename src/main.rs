mod auth;
mod bot;
mod commands;
mod config;
mod diagnostics;
mod forward;
mod logging;
mod platform;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::Bot;
use tracing::info;

use crate::bot::AppState;
use crate::config::Config;
use crate::diagnostics::DiagnosticSink;
use crate::platform::telegram::{self, TelegramApi};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    // Initialize logging
    let diagnostics = DiagnosticSink::with_limit(config.diagnostics.max_entries);
    let log_path = logging::init(&config.logging, &diagnostics)?;

    info!("Starting bot...");
    info!("Configuration loaded from: {}", config_path.display());
    info!("  Log file: {}", log_path.display());
    info!("  Source chat: {}", config.relay.source_chat_id.0);
    info!("  Destination chat: {}", config.relay.destination_chat_id.0);

    let bot = Bot::new(&config.telegram.bot_token);
    let api = Arc::new(TelegramApi::new(bot.clone()));
    let state = Arc::new(AppState::new(config, diagnostics, api));
    info!("  Allowed ids: {}", state.allow_list.len());

    telegram::run(bot, state).await
}
