//! Shared collaborators of the event handlers.

use crate::error::{BotError, Result};
use crate::events::{Attachment, Message};
use crate::platform::ChatPlatform;
use crate::reply::{ReplyRecord, ReplyRegistry};
use crate::staging::AttachmentStager;
use crate::transcription::{LanguageCode, TranscriptionGateway};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Text shown when the engine returns nothing.
pub const EMPTY_TRANSCRIPT: &str = "(no speech detected)";

/// Everything the router, pipeline and controllers work with.
pub struct BotContext {
    /// Chat platform.
    pub platform: Arc<dyn ChatPlatform>,
    /// Engine access.
    pub gateway: Arc<TranscriptionGateway>,
    /// Attachment downloads.
    pub stager: Arc<AttachmentStager>,
    /// Live reply records.
    pub replies: Arc<ReplyRegistry>,
    /// How long the bot keeps its own reactions on a reply.
    pub affordance_ttl: Option<Duration>,
}

impl std::fmt::Debug for BotContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotContext")
            .field("platform", &self.platform.name())
            .field("gateway", &self.gateway)
            .field("affordance_ttl", &self.affordance_ttl)
            .finish_non_exhaustive()
    }
}

impl BotContext {
    /// Whether `user_id` is the bot itself.
    #[must_use]
    pub fn is_self(&self, user_id: &str) -> bool {
        self.platform.bot_user_id() == user_id
    }

    /// Stage `attachment` and transcribe it. The staged file is gone by the
    /// time this returns, whatever the outcome.
    ///
    /// # Errors
    ///
    /// Fails when the download or the engine call fails.
    pub async fn transcribe_attachment(
        &self,
        attachment: &Attachment,
        model: Option<&str>,
        language: Option<&str>,
    ) -> Result<String> {
        let staged = self.stager.stage(attachment).await?;
        let text = self
            .gateway
            .transcribe(staged.path(), model, language)
            .await?;
        if text.is_empty() {
            return Ok(EMPTY_TRANSCRIPT.to_string());
        }
        Ok(text)
    }

    /// Stage `attachment` and rank its likely languages with the default
    /// model, padded from the language table.
    ///
    /// # Errors
    ///
    /// Fails when the download or the engine call fails.
    pub async fn detect_attachment_languages(
        &self,
        attachment: &Attachment,
    ) -> Result<Vec<LanguageCode>> {
        let staged = self.stager.stage(attachment).await?;
        Ok(self.gateway.detect_languages(staged.path(), None).await?)
    }

    /// The voice message behind `record`: the cached copy when there is one,
    /// otherwise fetched and cached.
    ///
    /// # Errors
    ///
    /// Fails when the fetch fails.
    pub async fn resolve_source(&self, record: &mut ReplyRecord) -> Result<Message> {
        if let Some(message) = record.cached_source() {
            return Ok(message.clone());
        }
        let source = record.source().clone();
        debug!(reply = %record.reply(), source = %source, "source not cached, fetching");
        let message = self
            .platform
            .fetch_message(&source.channel_id, &source.message_id)
            .await?;
        record.cache_source(message.clone());
        Ok(message)
    }
}

/// The single attachment of `message`.
///
/// # Errors
///
/// A message with zero or several attachments is a contract violation.
pub fn sole_attachment(message: &Message) -> Result<&Attachment> {
    message.sole_attachment().ok_or_else(|| {
        BotError::contract(format!(
            "message {} has {} attachments, expected exactly one",
            message.id,
            message.attachments.len()
        ))
    })
}
