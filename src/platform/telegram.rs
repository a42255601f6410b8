use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::{ChatId, MessageId};
use teloxide::utils::command::BotCommands;
use tracing::{debug, info, warn};

use crate::bot::{guarded, AppState};
use crate::commands;
use crate::forward;
use crate::platform::{ChannelPost, CommandContext, RelayApi};

/// Chunk size for outgoing text, kept below Telegram's 4096 character limit
const MAX_MESSAGE_LEN: usize = 4000;

#[derive(BotCommands, Clone, Copy, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    #[command(description = "describe this bot")]
    Start,
    #[command(description = "check that the bot is alive")]
    Test,
    #[command(description = "show errors and warnings recorded this session")]
    AdminTest,
    #[command(description = "fail on purpose to test error reporting")]
    RaiseError,
}

/// Split text into chunks of at most `max_len` bytes, preferring line and word breaks
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        // Walk back to a valid UTF-8 char boundary so slicing doesn't panic
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        let actual_end = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .or_else(|| text[start..end].rfind(' '))
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}

/// `RelayApi` backed by the Telegram Bot API
#[derive(Clone)]
pub struct TelegramApi {
    bot: Bot,
}

impl TelegramApi {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl RelayApi for TelegramApi {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()> {
        for chunk in split_message(text, MAX_MESSAGE_LEN) {
            self.bot.send_message(chat_id, chunk).await?;
        }
        Ok(())
    }

    async fn copy_message(&self, to: ChatId, from: ChatId, message_id: MessageId) -> Result<()> {
        self.bot.copy_message(to, from, message_id).await?;
        Ok(())
    }
}

/// Handler tree: one branch per command plus the channel-post relay.
/// Every endpoint goes through the same error boundary.
pub fn schema() -> UpdateHandler<anyhow::Error> {
    let command_handler = Update::filter_message()
        .filter_command::<Command>()
        .map(|msg: Message| CommandContext::from_message(&msg))
        .branch(
            dptree::filter(|cmd: Command| cmd == Command::Start)
                .endpoint(guarded("start", commands::start)),
        )
        .branch(
            dptree::filter(|cmd: Command| cmd == Command::Test)
                .endpoint(guarded("test", commands::test)),
        )
        .branch(
            dptree::filter(|cmd: Command| cmd == Command::AdminTest)
                .endpoint(guarded("admintest", commands::admin_test)),
        )
        .branch(
            dptree::filter(|cmd: Command| cmd == Command::RaiseError)
                .endpoint(guarded("raiseerror", commands::raise_error)),
        );

    let channel_post_handler = Update::filter_channel_post()
        .map(|post: Message| ChannelPost::from_message(&post))
        .endpoint(guarded("forward_message", forward::forward_post));

    dptree::entry()
        .branch(command_handler)
        .branch(channel_post_handler)
}

/// Run the relay until the process is interrupted
pub async fn run(bot: Bot, state: Arc<AppState>) -> Result<()> {
    info!("Starting Telegram platform...");

    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to publish command list: {}", e);
    }

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![state])
        .default_handler(|upd| async move {
            debug!("Ignoring update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text(
            "An error has occurred in the dispatcher",
        ))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Telegram platform stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::ControlFlow;

    use crate::bot::tests::{capture, test_state};
    use crate::platform::testing::{
        bot_me, channel_post, user_message, CopyRequest, RecordingApi,
    };

    /// Run one update through the handler tree. `None` means no branch took it.
    async fn dispatch(update: Update, state: Arc<AppState>) -> Option<Result<()>> {
        match schema()
            .dispatch(dptree::deps![update, bot_me(), state])
            .await
        {
            ControlFlow::Break(result) => Some(result),
            ControlFlow::Continue(_) => None,
        }
    }

    #[test]
    fn test_short_message_single_chunk() {
        assert_eq!(split_message("alive", 10), vec!["alive"]);
    }

    #[test]
    fn test_split_prefers_newlines() {
        let text = "line one\nline two\nline three";
        let chunks = split_message(text, 12);
        assert_eq!(chunks, vec!["line one\n", "line two\n", "line three"]);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_split_respects_char_boundaries() {
        let text = "привет".repeat(10);
        let chunks = split_message(&text, 7);
        assert!(chunks.iter().all(|c| c.len() <= 7));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_command_parsing() {
        assert_eq!(
            Command::parse("/admintest", "relay_bot").unwrap(),
            Command::AdminTest
        );
        assert_eq!(
            Command::parse("/raiseerror@relay_bot", "relay_bot").unwrap(),
            Command::RaiseError
        );
        assert_eq!(Command::parse("/test", "relay_bot").unwrap(), Command::Test);
        assert!(Command::parse("/clear", "relay_bot").is_err());
    }

    #[tokio::test]
    async fn test_channel_post_from_source_is_copied() {
        let api = Arc::new(RecordingApi::default());
        let state = test_state(api.clone());

        let result = dispatch(channel_post(100, 55), state).await;

        assert!(matches!(result, Some(Ok(()))));
        assert_eq!(
            api.copies(),
            vec![CopyRequest {
                to: ChatId(200),
                from: ChatId(100),
                message_id: MessageId(55),
            }]
        );
    }

    #[tokio::test]
    async fn test_channel_post_from_other_chat_not_copied() {
        let api = Arc::new(RecordingApi::default());
        let state = test_state(api.clone());

        dispatch(channel_post(999, 55), state).await;

        assert!(api.copies().is_empty());
    }

    #[tokio::test]
    async fn test_ordinary_message_in_source_chat_not_copied() {
        let api = Arc::new(RecordingApi::default());
        let state = test_state(api.clone());

        let result = dispatch(user_message(100, 7, "hello"), state).await;

        assert!(result.is_none());
        assert!(api.copies().is_empty());
        assert!(api.replies().is_empty());
    }

    #[tokio::test]
    async fn test_commands_reach_their_handlers() {
        let api = Arc::new(RecordingApi::default());
        let state = test_state(api.clone());

        dispatch(user_message(50, 8, "/start"), state.clone())
            .await
            .unwrap()
            .unwrap();
        dispatch(user_message(50, 7, "/test@relay_bot now"), state.clone())
            .await
            .unwrap()
            .unwrap();
        dispatch(user_message(50, 7, "/admintest"), state.clone())
            .await
            .unwrap()
            .unwrap();

        let replies = api.replies();
        assert_eq!(replies.len(), 3);
        assert_eq!(replies[0].1, state.config.messages.start);
        assert_eq!(replies[1].1, state.config.messages.alive);
        assert_eq!(replies[2].1, state.config.messages.no_errors);
        assert!(api.copies().is_empty());
    }

    #[tokio::test]
    async fn test_raise_error_reaches_dispatcher_as_error() {
        let api = Arc::new(RecordingApi::default());
        let state = test_state(api.clone());
        let _guard = capture(&state);

        let result = dispatch(user_message(50, 7, "/raiseerror"), state.clone()).await;

        let err = result.unwrap().unwrap_err();
        assert_eq!(err.to_string(), commands::TEST_ERROR);
        let entries = state.diagnostics.snapshot();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].contains("Exception in command raiseerror"));
    }

    #[tokio::test]
    async fn test_unknown_command_ignored() {
        let api = Arc::new(RecordingApi::default());
        let state = test_state(api.clone());

        let result = dispatch(user_message(50, 7, "/clear"), state).await;

        assert!(result.is_none());
        assert!(api.replies().is_empty());
    }
}
