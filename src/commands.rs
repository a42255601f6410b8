use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::{info, warn};

use crate::bot::AppState;
use crate::platform::CommandContext;

pub const TEST_ERROR: &str = "This is a test exception";

/// `/start`: open to everyone
pub async fn start(ctx: CommandContext, state: Arc<AppState>) -> Result<()> {
    state
        .api
        .send_text(ctx.chat_id, &state.config.messages.start)
        .await
}

/// `/test`: liveness check
pub async fn test(ctx: CommandContext, state: Arc<AppState>) -> Result<()> {
    if !state.is_authorized(&ctx) {
        warn!(
            "Command /test attempted by unauthorized user {}",
            ctx.sender_label()
        );
        return Ok(());
    }

    info!(
        text = ?ctx.text,
        "Command /test received from allowed user/chat {}/{}",
        ctx.sender_label(),
        ctx.chat_id.0
    );
    state
        .api
        .send_text(ctx.chat_id, &state.config.messages.alive)
        .await
}

/// `/admintest`: dump every warning and error recorded since startup
pub async fn admin_test(ctx: CommandContext, state: Arc<AppState>) -> Result<()> {
    if !state.is_authorized(&ctx) {
        warn!(
            "Command /admintest attempted by unauthorized user {}",
            ctx.sender_label()
        );
        return Ok(());
    }

    info!(
        text = ?ctx.text,
        "Command /admintest received from allowed user/chat {}/{}",
        ctx.sender_label(),
        ctx.chat_id.0
    );

    let response = match state.diagnostics.render() {
        Some(report) => {
            info!(
                "Reporting {} recorded errors and warnings",
                state.diagnostics.len()
            );
            report
        }
        None => {
            info!("No errors or warnings reported.");
            state.config.messages.no_errors.clone()
        }
    };

    state.api.send_text(ctx.chat_id, &response).await
}

/// `/raiseerror`: fail on purpose to exercise the error path end to end
pub async fn raise_error(ctx: CommandContext, state: Arc<AppState>) -> Result<()> {
    if !state.is_authorized(&ctx) {
        warn!(
            "Command /raiseerror attempted by unauthorized user {}",
            ctx.sender_label()
        );
        return Ok(());
    }

    info!(
        text = ?ctx.text,
        "Command /raiseerror received from allowed user/chat {}/{}",
        ctx.sender_label(),
        ctx.chat_id.0
    );
    bail!(TEST_ERROR)
}
