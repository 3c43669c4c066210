//! Model and language selector attached to a configuring reply.

use super::record::ReplyRecord;
use crate::context::{BotContext, sole_attachment};
use crate::error::Result;
use crate::events::{ComponentInteraction, ViewAction};
use crate::models::ModelRegistry;
use crate::platform::{ButtonControl, MessageEdit, SelectControl, SelectOption, SelectorView};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Label of the retranscribe button.
pub const RETRANSCRIBE_LABEL: &str = "Retranscribe";

/// Build the selector for `record`.
///
/// The language default is the selected language, else the top candidate.
/// The model default is the selected model, else the registry default. The
/// retranscribe button is enabled only once both were explicitly chosen and
/// no retranscription is running.
#[must_use]
pub fn render(record: &ReplyRecord, registry: &ModelRegistry) -> SelectorView {
    let controls_disabled = !record.controls_enabled();

    let shown_language = record
        .selected_language()
        .or_else(|| record.candidate_languages().first().map(|l| l.code.as_str()));
    let language = SelectControl {
        options: record
            .candidate_languages()
            .iter()
            .map(|lang| SelectOption {
                label: lang.label.clone(),
                value: lang.code.clone(),
                default: Some(lang.code.as_str()) == shown_language,
            })
            .collect(),
        disabled: controls_disabled,
    };

    let shown_model = record
        .selected_model()
        .unwrap_or(&registry.default_model().id);
    let model = SelectControl {
        options: registry
            .models()
            .iter()
            .map(|m| SelectOption {
                label: m.id.clone(),
                value: m.id.clone(),
                default: m.id == shown_model,
            })
            .collect(),
        disabled: controls_disabled,
    };

    SelectorView {
        language,
        model,
        retranscribe: ButtonControl {
            label: RETRANSCRIBE_LABEL.to_string(),
            disabled: !record.can_retranscribe(),
        },
    }
}

/// Handles interactions with the selector view.
#[derive(Debug, Clone)]
pub struct SelectorController {
    ctx: Arc<BotContext>,
}

impl SelectorController {
    /// Create a controller over `ctx`.
    #[must_use]
    pub const fn new(ctx: Arc<BotContext>) -> Self {
        Self { ctx }
    }

    /// Apply one selector interaction.
    ///
    /// Selections wait for the reply's gate. A retranscribe pressed while
    /// the reply is busy is dropped, so at most one retranscription per
    /// reply is ever in flight.
    ///
    /// # Errors
    ///
    /// Fails when the platform or engine calls fail, or when the source
    /// message does not carry exactly one attachment.
    pub async fn handle(&self, interaction: ComponentInteraction) -> Result<()> {
        let Some(shared) = self.ctx.replies.get(&interaction.reply).await else {
            debug!(reply = %interaction.reply, "selector interaction on unknown reply");
            return Ok(());
        };
        let mut record = if interaction.action == ViewAction::Retranscribe {
            let Ok(record) = shared.try_lock() else {
                debug!(reply = %interaction.reply, "reply busy, retranscribe dropped");
                return Ok(());
            };
            record
        } else {
            shared.lock().await
        };
        if record.is_closed() {
            return Ok(());
        }

        let registry = self.ctx.gateway.registry();
        match interaction.action {
            ViewAction::SelectLanguage(code) => {
                if !record.select_language(&code) {
                    debug!(reply = %interaction.reply, language = %code, "language selection ignored");
                    return Ok(());
                }
                debug!(reply = %interaction.reply, language = %code, "language selected");
            }
            ViewAction::SelectModel(id) => {
                if !registry.contains(&id) || !record.select_model(&id) {
                    debug!(reply = %interaction.reply, model = %id, "model selection ignored");
                    return Ok(());
                }
                debug!(reply = %interaction.reply, model = %id, "model selected");
            }
            ViewAction::Retranscribe => return self.retranscribe(&mut record).await,
        }

        let view = render(&record, registry);
        self.ctx
            .platform
            .edit_message(record.reply(), MessageEdit::view(view))
            .await?;
        Ok(())
    }

    async fn retranscribe(&self, record: &mut ReplyRecord) -> Result<()> {
        let Some(request) = record.begin_retranscribe() else {
            debug!(reply = %record.reply(), "retranscribe not ready");
            return Ok(());
        };
        let registry = self.ctx.gateway.registry();
        let reply = record.reply().clone();

        if let Err(e) = self
            .ctx
            .platform
            .edit_message(&reply, MessageEdit::view(render(record, registry)))
            .await
        {
            record.finish_retranscribe();
            return Err(e.into());
        }

        info!(reply = %reply, model = %request.model, language = %request.language, "retranscribing");
        let outcome = async {
            let source = self.ctx.resolve_source(record).await?;
            let attachment = sole_attachment(&source)?;
            self.ctx
                .transcribe_attachment(attachment, Some(&request.model), Some(&request.language))
                .await
        }
        .await;

        record.finish_retranscribe();
        let view = render(record, registry);
        match outcome {
            Ok(text) => {
                self.ctx
                    .platform
                    .edit_message(&reply, MessageEdit::text_and_view(text, view))
                    .await?;
                Ok(())
            }
            Err(e) => {
                warn!(reply = %reply, error = %e, "retranscription failed, restoring controls");
                self.ctx
                    .platform
                    .edit_message(&reply, MessageEdit::view(view))
                    .await?;
                Err(e)
            }
        }
    }
}
