//! From an incoming attachment to a bot reply.

use crate::context::{BotContext, sole_attachment};
use crate::error::{BotError, Result};
use crate::events::{Attachment, ContextMenuInvocation, Message, MessageRef, ReactionKind};
use crate::reply::ReplyRecord;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Follow-up sent when the context-menu action targets a message without
/// attachments.
pub const NO_ATTACHMENTS: &str = "No attachments found.";

/// Follow-up sent for an attachment that could not be transcribed.
pub const TRANSCRIPTION_FAILED: &str = "Could not transcribe this attachment.";

/// Turns attachments into transcribed replies.
#[derive(Debug, Clone)]
pub struct TranscriptionPipeline {
    ctx: Arc<BotContext>,
}

impl TranscriptionPipeline {
    /// Create a pipeline over `ctx`.
    #[must_use]
    pub const fn new(ctx: Arc<BotContext>) -> Self {
        Self { ctx }
    }

    /// Transcribe a voice message and reply with controls attached.
    ///
    /// # Errors
    ///
    /// A voice message without exactly one attachment is a contract
    /// violation and gets no reply. Download, engine and send failures are
    /// returned as they happen.
    pub async fn handle_voice(&self, message: &Message) -> Result<()> {
        let attachment = sole_attachment(message)?;
        self.reply_with_controls(message, attachment).await
    }

    /// Transcribe every attachment of a direct message, one reply each.
    ///
    /// Controls are attached only when there is exactly one attachment,
    /// since configuring a reply needs an unambiguous source.
    ///
    /// # Errors
    ///
    /// Returns the first failure after all attachments were attempted.
    pub async fn handle_direct(&self, message: &Message) -> Result<()> {
        if let Some(attachment) = message.sole_attachment() {
            return self.reply_with_controls(message, attachment).await;
        }

        let mut first_error: Option<BotError> = None;
        for attachment in &message.attachments {
            let outcome = async {
                let text = self.ctx.transcribe_attachment(attachment, None, None).await?;
                self.ctx.platform.send_reply(&message.id, &text).await?;
                Ok::<_, BotError>(())
            }
            .await;
            if let Err(e) = outcome {
                warn!(message = %message.id, attachment = %attachment.id, error = %e, "attachment failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Answer the "Voice to text" action with one follow-up per attachment.
    ///
    /// # Errors
    ///
    /// Fails when the interaction cannot be deferred or answered; the first
    /// transcription failure is returned after every attachment was
    /// answered.
    pub async fn handle_context_menu(&self, invocation: &ContextMenuInvocation) -> Result<()> {
        let token = &invocation.token;
        self.ctx.platform.defer_interaction(token).await?;

        let target = &invocation.target;
        if target.attachments.is_empty() {
            debug!(message = %target.id, "context menu on message without attachments");
            self.ctx.platform.send_followup(token, NO_ATTACHMENTS).await?;
            return Ok(());
        }

        let mut first_error: Option<BotError> = None;
        for attachment in &target.attachments {
            match self.ctx.transcribe_attachment(attachment, None, None).await {
                Ok(text) => self.ctx.platform.send_followup(token, &text).await?,
                Err(e) => {
                    warn!(message = %target.id, attachment = %attachment.id, error = %e, "attachment failed");
                    self.ctx
                        .platform
                        .send_followup(token, TRANSCRIPTION_FAILED)
                        .await?;
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn reply_with_controls(&self, message: &Message, attachment: &Attachment) -> Result<()> {
        let text = self.ctx.transcribe_attachment(attachment, None, None).await?;
        let reply = self.ctx.platform.send_reply(&message.id, &text).await?;

        let record = ReplyRecord::new(reply.clone(), message.id.clone())
            .with_cached_source(message.clone());
        let Some(shared) = self.ctx.replies.insert(record).await else {
            return Ok(());
        };
        {
            // Reactions on the reply wait until the affordances are in place.
            let mut record = shared.lock().await;
            self.ctx
                .platform
                .add_reaction(&reply, ReactionKind::DeleteControl)
                .await?;
            self.ctx
                .platform
                .add_reaction(&reply, ReactionKind::ConfigureControl)
                .await?;
            record.mark_transcribed();
        }
        info!(source = %message.id, reply = %reply, "reply sent");

        if let Some(ttl) = self.ctx.affordance_ttl {
            self.expire_affordances(reply, ttl);
        }
        Ok(())
    }

    /// Withdraw the bot's own reactions from `reply` after `ttl`.
    ///
    /// The record is dropped with them unless a selector is open; a later
    /// reaction adopts the reply again.
    fn expire_affordances(&self, reply: MessageRef, ttl: Duration) {
        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let Some(shared) = ctx.replies.get(&reply).await else {
                return;
            };
            let mut record = shared.lock().await;
            if record.is_closed() {
                return;
            }
            let bot = ctx.platform.bot_user_id().to_string();
            for kind in [ReactionKind::ConfigureControl, ReactionKind::DeleteControl] {
                if let Err(e) = ctx.platform.remove_reaction(&reply, kind, &bot).await {
                    warn!(reply = %reply, kind = ?kind, error = %e, "failed to withdraw affordance");
                }
            }
            record.withdraw_affordances();
            if record.is_configuring() {
                debug!(reply = %reply, "affordances withdrawn, selector still open");
            } else {
                ctx.replies.evict(&reply).await;
                debug!(reply = %reply, "affordances withdrawn, record dropped");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::InteractionToken;
    use crate::reply::{ReactionControls, ReplyState};
    use crate::testing::{
        BOT_ID, FakeEngine, FakePlatform, USER_ID, direct_message, test_context, voice_message,
    };

    fn pipeline(platform: &Arc<FakePlatform>, engine: &Arc<FakeEngine>) -> TranscriptionPipeline {
        TranscriptionPipeline::new(test_context(platform, engine))
    }

    fn invocation(target: Message) -> ContextMenuInvocation {
        ContextMenuInvocation {
            token: InteractionToken {
                id: "i1".into(),
                channel_id: target.id.channel_id.clone(),
            },
            user_id: USER_ID.into(),
            target,
        }
    }

    #[tokio::test]
    async fn test_voice_message_gets_one_reply_with_controls() {
        let platform = Arc::new(FakePlatform::new());
        let engine = Arc::new(FakeEngine::new());
        let pipeline = pipeline(&platform, &engine);

        let voice = voice_message("v1", 1);
        pipeline.handle_voice(&voice).await.unwrap();

        let replies = platform.replies();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].parent, voice.id);
        assert_eq!(replies[0].text, "text from small (auto)");

        let reply = &replies[0].reply;
        assert_eq!(
            platform.reactions_added(),
            vec![
                (reply.clone(), ReactionKind::DeleteControl),
                (reply.clone(), ReactionKind::ConfigureControl),
            ]
        );

        let shared = pipeline.ctx.replies.get(reply).await.unwrap();
        let record = shared.lock().await;
        assert_eq!(record.state(), ReplyState::Transcribed);
        assert!(record.cached_source().is_some());
    }

    #[tokio::test]
    async fn test_voice_message_attachment_count_is_a_contract() {
        let platform = Arc::new(FakePlatform::new());
        let engine = Arc::new(FakeEngine::new());
        let pipeline = pipeline(&platform, &engine);

        for count in [0, 2, 3] {
            let err = pipeline
                .handle_voice(&voice_message("v", count))
                .await
                .unwrap_err();
            assert!(err.is_contract_violation());
        }
        assert!(platform.replies().is_empty());
        assert!(engine.transcribe_calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_download_sends_nothing() {
        let platform = Arc::new(FakePlatform::new());
        platform.fail_downloads(true);
        let engine = Arc::new(FakeEngine::new());
        let pipeline = pipeline(&platform, &engine);

        let err = pipeline.handle_voice(&voice_message("v1", 1)).await.unwrap_err();
        assert!(matches!(err, BotError::Platform(_)));
        assert!(platform.replies().is_empty());
        assert_eq!(std::fs::read_dir(pipeline.ctx.stager.dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_direct_message_each_attachment() {
        let platform = Arc::new(FakePlatform::new());
        let engine = Arc::new(FakeEngine::new());
        let pipeline = pipeline(&platform, &engine);

        pipeline.handle_direct(&direct_message("d1", 3)).await.unwrap();
        assert_eq!(platform.replies().len(), 3);
        assert!(platform.reactions_added().is_empty());
        assert!(pipeline.ctx.replies.is_empty().await);
    }

    #[tokio::test]
    async fn test_direct_message_single_attachment_gets_controls() {
        let platform = Arc::new(FakePlatform::new());
        let engine = Arc::new(FakeEngine::new());
        let pipeline = pipeline(&platform, &engine);

        pipeline.handle_direct(&direct_message("d1", 1)).await.unwrap();
        assert_eq!(platform.replies().len(), 1);
        assert_eq!(platform.reactions_added().len(), 2);
    }

    #[tokio::test]
    async fn test_context_menu_follow_ups() {
        let platform = Arc::new(FakePlatform::new());
        let engine = Arc::new(FakeEngine::new());
        let pipeline = pipeline(&platform, &engine);

        let target = Message::new(MessageRef::new("chat", "m1"), USER_ID)
            .with_attachment(Attachment::new("a", "fa"))
            .with_attachment(Attachment::new("b", "fb"));
        pipeline.handle_context_menu(&invocation(target)).await.unwrap();

        assert_eq!(platform.deferred().len(), 1);
        let followups = platform.followups();
        assert_eq!(followups.len(), 2);
        assert!(followups.iter().all(|(t, _)| t.id == "i1"));
        assert!(platform.replies().is_empty());
    }

    #[tokio::test]
    async fn test_context_menu_without_attachments() {
        let platform = Arc::new(FakePlatform::new());
        let engine = Arc::new(FakeEngine::new());
        let pipeline = pipeline(&platform, &engine);

        let target = Message::new(MessageRef::new("chat", "m1"), USER_ID).with_content("hi");
        pipeline.handle_context_menu(&invocation(target)).await.unwrap();

        assert_eq!(platform.deferred().len(), 1);
        let followups = platform.followups();
        assert_eq!(followups.len(), 1);
        assert_eq!(followups[0].1, NO_ATTACHMENTS);
    }

    #[tokio::test]
    async fn test_context_menu_reports_failure() {
        let platform = Arc::new(FakePlatform::new());
        let engine = Arc::new(FakeEngine::new());
        engine.fail_transcriptions(true);
        let pipeline = pipeline(&platform, &engine);

        let target = voice_message("v1", 1);
        assert!(pipeline.handle_context_menu(&invocation(target)).await.is_err());
        assert_eq!(platform.followups()[0].1, TRANSCRIPTION_FAILED);
    }

    #[tokio::test(start_paused = true)]
    async fn test_affordances_expire() {
        let platform = Arc::new(FakePlatform::new());
        let engine = Arc::new(FakeEngine::new());
        let ctx = test_context(&platform, &engine);
        let ctx = Arc::new(BotContext {
            platform: Arc::clone(&ctx.platform),
            gateway: Arc::clone(&ctx.gateway),
            stager: Arc::clone(&ctx.stager),
            replies: Arc::clone(&ctx.replies),
            affordance_ttl: Some(Duration::from_secs(60)),
        });
        let pipeline = TranscriptionPipeline::new(Arc::clone(&ctx));

        let voice = voice_message("v1", 1);
        platform.insert_message(voice.clone());
        pipeline.handle_voice(&voice).await.unwrap();
        let reply = platform.replies()[0].reply.clone();

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(platform.reactions_removed().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let removed = platform.reactions_removed();
        assert_eq!(removed.len(), 2);
        assert!(removed.iter().all(|(m, _, actor)| m == &reply && actor == BOT_ID));
        assert!(ctx.replies.get(&reply).await.is_none());
        assert!(!ctx.replies.is_deleted(&reply).await);

        // the reply is adopted again on the next reaction
        ReactionControls::new(Arc::clone(&ctx))
            .on_added(&reply, ReactionKind::ConfigureControl)
            .await
            .unwrap();
        assert!(platform.current_view(&reply).is_some());
        // the reply and then its source
        assert_eq!(platform.fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_keeps_open_selector_until_detached() {
        let platform = Arc::new(FakePlatform::new());
        let engine = Arc::new(FakeEngine::new());
        let ctx = test_context(&platform, &engine);
        let ctx = Arc::new(BotContext {
            platform: Arc::clone(&ctx.platform),
            gateway: Arc::clone(&ctx.gateway),
            stager: Arc::clone(&ctx.stager),
            replies: Arc::clone(&ctx.replies),
            affordance_ttl: Some(Duration::from_secs(60)),
        });
        let pipeline = TranscriptionPipeline::new(Arc::clone(&ctx));
        let controls = ReactionControls::new(Arc::clone(&ctx));

        pipeline.handle_voice(&voice_message("v1", 1)).await.unwrap();
        let reply = platform.replies()[0].reply.clone();
        controls
            .on_added(&reply, ReactionKind::ConfigureControl)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(platform.reactions_removed().len(), 2);
        assert!(ctx.replies.get(&reply).await.is_some());

        controls
            .on_removed(&reply, ReactionKind::ConfigureControl)
            .await
            .unwrap();
        assert!(platform.current_view(&reply).is_none());
        assert!(ctx.replies.get(&reply).await.is_none());
    }
}
