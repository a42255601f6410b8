use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use crate::bot::AppState;
use crate::platform::ChannelPost;

/// Copy a post from the source channel into the destination chat.
///
/// Posts from any other channel are ignored. A failed copy is logged and
/// dropped so the dispatcher keeps going; there is no retry and no
/// deduplication of repeated deliveries.
pub async fn forward_post(post: ChannelPost, state: Arc<AppState>) -> Result<()> {
    let relay = &state.config.relay;
    if post.chat_id != relay.source_chat_id {
        return Ok(());
    }

    info!(
        "Forwarding message from {} to {} with message ID {}",
        post.chat_id.0, relay.destination_chat_id.0, post.message_id.0
    );

    if let Err(e) = state
        .api
        .copy_message(relay.destination_chat_id, post.chat_id, post.message_id)
        .await
    {
        error!("Failed to forward message: {:#}", e);
    }

    Ok(())
}
