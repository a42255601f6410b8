use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use futures::future::BoxFuture;
use tracing::error;

use crate::auth::AllowList;
use crate::config::Config;
use crate::diagnostics::DiagnosticSink;
use crate::platform::{CommandContext, RelayApi};

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub allow_list: AllowList,
    pub diagnostics: DiagnosticSink,
    pub api: Arc<dyn RelayApi>,
}

impl AppState {
    pub fn new(config: Config, diagnostics: DiagnosticSink, api: Arc<dyn RelayApi>) -> Self {
        let allow_list = AllowList::new(config.telegram.allowed_ids.iter().cloned());
        Self {
            config,
            allow_list,
            diagnostics,
            api,
        }
    }

    /// Either the sender or the chat the command was sent in must be allow-listed
    pub fn is_authorized(&self, ctx: &CommandContext) -> bool {
        self.allow_list.is_authorized(
            ctx.user_id.as_deref().unwrap_or_default(),
            &ctx.chat_id.0.to_string(),
        )
    }
}

/// Wrap a handler so that any error it returns is logged with the handler's
/// name before being passed on to the dispatcher unchanged.
pub fn guarded<A, F, Fut>(
    name: &'static str,
    handler: F,
) -> impl Fn(A, Arc<AppState>) -> BoxFuture<'static, Result<()>> + Clone + Send + Sync + 'static
where
    A: Send + 'static,
    F: Fn(A, Arc<AppState>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    move |input, state| {
        let fut = handler(input, state);
        Box::pin(async move {
            let result = fut.await;
            if let Err(e) = &result {
                error!("Exception in command {}: {}", name, e);
            }
            result
        })
    }
}
