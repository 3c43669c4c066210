//! Classifies inbound events and hands them to the right handler.

use crate::context::BotContext;
use crate::error::Result;
use crate::events::{ChatEvent, Message};
use crate::pipeline::TranscriptionPipeline;
use crate::reply::{ReactionControls, SelectorController};
use std::sync::Arc;
use tracing::debug;

/// Top-level event dispatcher.
#[derive(Debug, Clone)]
pub struct EventRouter {
    ctx: Arc<BotContext>,
    pipeline: TranscriptionPipeline,
    controls: ReactionControls,
    selector: SelectorController,
}

impl EventRouter {
    /// Build a router and its handlers over `ctx`.
    #[must_use]
    pub fn new(ctx: Arc<BotContext>) -> Self {
        Self {
            pipeline: TranscriptionPipeline::new(Arc::clone(&ctx)),
            controls: ReactionControls::new(Arc::clone(&ctx)),
            selector: SelectorController::new(Arc::clone(&ctx)),
            ctx,
        }
    }

    /// Shared context.
    #[must_use]
    pub fn context(&self) -> &Arc<BotContext> {
        &self.ctx
    }

    /// Handle one event to completion.
    ///
    /// Events caused by the bot itself are ignored.
    ///
    /// # Errors
    ///
    /// Returns whatever the handler for the event returned.
    pub async fn handle(&self, event: ChatEvent) -> Result<()> {
        if self.ctx.is_self(event.actor_id()) {
            debug!(kind = event.kind(), "ignoring own event");
            return Ok(());
        }

        match event {
            ChatEvent::NewMessage(message) => self.on_message(&message).await,
            ChatEvent::ReactionAdded(reaction) => {
                self.controls
                    .on_added(&reaction.message, reaction.kind)
                    .await
            }
            ChatEvent::ReactionRemoved(reaction) => {
                self.controls
                    .on_removed(&reaction.message, reaction.kind)
                    .await
            }
            ChatEvent::ContextMenuInvoked(invocation) => {
                self.pipeline.handle_context_menu(&invocation).await
            }
            ChatEvent::Component(interaction) => self.selector.handle(interaction).await,
        }
    }

    async fn on_message(&self, message: &Message) -> Result<()> {
        if message.is_voice() {
            debug!(message = %message.id, "voice message");
            return self.pipeline.handle_voice(message).await;
        }
        if message.is_direct() && !message.attachments.is_empty() {
            debug!(
                message = %message.id,
                attachments = message.attachments.len(),
                "direct message with attachments"
            );
            return self.pipeline.handle_direct(message).await;
        }
        Ok(())
    }
}
