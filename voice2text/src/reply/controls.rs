//! Reaction affordances on bot replies.

use super::record::ReplyRecord;
use super::registry::SharedRecord;
use super::selector::render;
use crate::context::{BotContext, sole_attachment};
use crate::error::{PlatformError, Result};
use crate::events::{MessageRef, ReactionKind};
use crate::platform::MessageEdit;
use std::sync::Arc;
use tracing::{debug, info};

/// Drives reply state from delete and configure reactions.
///
/// Reaction handlers wait for the reply's gate rather than skipping a busy
/// reply, so a removal that arrives during a retranscription is applied
/// after it and its view detachment is the last write.
#[derive(Debug, Clone)]
pub struct ReactionControls {
    ctx: Arc<BotContext>,
}

impl ReactionControls {
    /// Create the controls over `ctx`.
    #[must_use]
    pub const fn new(ctx: Arc<BotContext>) -> Self {
        Self { ctx }
    }

    /// A user added `kind` to `message`.
    ///
    /// # Errors
    ///
    /// Fails when a platform or engine call fails, or when the source
    /// message does not carry exactly one attachment.
    pub async fn on_added(&self, message: &MessageRef, kind: ReactionKind) -> Result<()> {
        match kind {
            ReactionKind::DeleteControl => self.on_delete(message).await,
            ReactionKind::ConfigureControl => self.on_configure_added(message).await,
            ReactionKind::Other => Ok(()),
        }
    }

    /// A user removed `kind` from `message`.
    ///
    /// # Errors
    ///
    /// Fails when the view cannot be detached.
    pub async fn on_removed(&self, message: &MessageRef, kind: ReactionKind) -> Result<()> {
        match kind {
            ReactionKind::ConfigureControl => self.on_configure_removed(message).await,
            ReactionKind::DeleteControl | ReactionKind::Other => Ok(()),
        }
    }

    async fn on_delete(&self, message: &MessageRef) -> Result<()> {
        let Some(shared) = self.lookup_or_adopt(message).await? else {
            return Ok(());
        };
        let mut record = shared.lock().await;
        if record.is_closed() {
            return Ok(());
        }

        self.ctx.platform.delete_message(message).await?;
        record.close();
        self.ctx.replies.remove(message).await;
        info!(reply = %message, "reply deleted");
        Ok(())
    }

    async fn on_configure_added(&self, message: &MessageRef) -> Result<()> {
        let Some(shared) = self.lookup_or_adopt(message).await? else {
            return Ok(());
        };
        let mut record = shared.lock().await;
        if record.is_closed() {
            return Ok(());
        }
        if record.is_configuring() {
            debug!(reply = %message, state = %record.state(), "already configuring");
            return Ok(());
        }

        let source = self.ctx.resolve_source(&mut record).await?;
        let attachment = sole_attachment(&source)?;
        let candidates = self.ctx.detect_attachment_languages(attachment).await?;

        record.begin_configuring(candidates);
        let view = render(&record, self.ctx.gateway.registry());
        if let Err(e) = self
            .ctx
            .platform
            .edit_message(message, MessageEdit::view(view))
            .await
        {
            record.end_configuring();
            return Err(e.into());
        }
        debug!(
            reply = %message,
            candidates = record.candidate_languages().len(),
            "selector attached"
        );
        Ok(())
    }

    async fn on_configure_removed(&self, message: &MessageRef) -> Result<()> {
        let Some(shared) = self.ctx.replies.get(message).await else {
            return Ok(());
        };
        let mut record = shared.lock().await;
        if record.is_closed() || !record.end_configuring() {
            return Ok(());
        }
        self.ctx
            .platform
            .edit_message(message, MessageEdit::remove_view())
            .await?;
        debug!(reply = %message, "selector detached");
        if record.affordances_withdrawn() {
            self.ctx.replies.evict(message).await;
        }
        Ok(())
    }

    /// The record for `message`, creating one when `message` is a bot reply
    /// the registry does not know yet.
    async fn lookup_or_adopt(&self, message: &MessageRef) -> Result<Option<SharedRecord>> {
        if let Some(shared) = self.ctx.replies.get(message).await {
            return Ok(Some(shared));
        }
        if self.ctx.replies.is_deleted(message).await {
            return Ok(None);
        }

        let fetched = match self
            .ctx
            .platform
            .fetch_message(&message.channel_id, &message.message_id)
            .await
        {
            Ok(m) => m,
            Err(PlatformError::NotFound(_)) => {
                debug!(message = %message, "reacted message not found, ignoring");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        if !self.ctx.is_self(&fetched.author_id) {
            debug!(message = %message, "reaction on a message the bot did not write");
            return Ok(None);
        }
        let Some(source) = fetched.reference else {
            debug!(message = %message, "bot message is not a reply");
            return Ok(None);
        };

        debug!(reply = %message, source = %source, "adopting reply");
        Ok(self
            .ctx
            .replies
            .insert(ReplyRecord::adopted(message.clone(), source))
            .await)
    }
}
