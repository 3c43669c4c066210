//! Chat platform abstraction.
//!
//! The core never talks to a transport directly. Everything it needs from
//! the chat platform (sending and editing replies, reactions, fetching
//! messages, downloading attachments, interactive views) goes through
//! [`ChatPlatform`].

use crate::bus::EventBus;
use crate::error::PlatformResult;
use crate::events::{Attachment, InteractionToken, Message, MessageRef, ReactionKind};
use async_trait::async_trait;
use std::path::Path;

/// One option of a selection control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    /// Human-readable label.
    pub label: String,
    /// Value reported back on selection.
    pub value: String,
    /// Whether this option is displayed as the current choice.
    pub default: bool,
}

/// A dropdown-like selection control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectControl {
    /// Options in display order.
    pub options: Vec<SelectOption>,
    /// Whether the control ignores interaction.
    pub disabled: bool,
}

impl SelectControl {
    /// Value of the option marked as default, if any.
    #[must_use]
    pub fn default_value(&self) -> Option<&str> {
        self.options
            .iter()
            .find(|o| o.default)
            .map(|o| o.value.as_str())
    }
}

/// A push button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonControl {
    /// Button label.
    pub label: String,
    /// Whether the button ignores interaction.
    pub disabled: bool,
}

/// The model/language selector attached to a bot reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorView {
    /// Candidate spoken languages.
    pub language: SelectControl,
    /// Registered models.
    pub model: SelectControl,
    /// Retranscribe action.
    pub retranscribe: ButtonControl,
}

/// What to do with the interactive view of an edited message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ViewEdit {
    /// Leave the current view untouched.
    #[default]
    Keep,
    /// Replace (or attach) the view.
    Replace(SelectorView),
    /// Remove the view, keeping the text.
    Remove,
}

/// An edit to an existing message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageEdit {
    /// New text, or `None` to keep the current text.
    pub content: Option<String>,
    /// View change.
    pub view: ViewEdit,
}

impl MessageEdit {
    /// Replace only the view.
    #[must_use]
    pub const fn view(view: SelectorView) -> Self {
        Self {
            content: None,
            view: ViewEdit::Replace(view),
        }
    }

    /// Remove the view, keeping the text.
    #[must_use]
    pub const fn remove_view() -> Self {
        Self {
            content: None,
            view: ViewEdit::Remove,
        }
    }

    /// Replace text and view together.
    pub fn text_and_view(content: impl Into<String>, view: SelectorView) -> Self {
        Self {
            content: Some(content.into()),
            view: ViewEdit::Replace(view),
        }
    }
}

/// Chat platform surface consumed by the core.
///
/// Every method is a network call from the caller's point of view and may
/// suspend.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Name of the platform, for logging.
    fn name(&self) -> &str;

    /// User id of the bot itself.
    fn bot_user_id(&self) -> &str;

    /// Start delivering inbound events to `bus`.
    async fn start(&self, bus: &EventBus) -> PlatformResult<()>;

    /// Stop delivering events.
    async fn stop(&self) -> PlatformResult<()>;

    /// Reply to `parent` with `text`, returning the reply's address.
    async fn send_reply(&self, parent: &MessageRef, text: &str) -> PlatformResult<MessageRef>;

    /// Edit a message's text and/or interactive view.
    async fn edit_message(&self, message: &MessageRef, edit: MessageEdit) -> PlatformResult<()>;

    /// Delete a message.
    async fn delete_message(&self, message: &MessageRef) -> PlatformResult<()>;

    /// Add a reaction as the bot.
    async fn add_reaction(&self, message: &MessageRef, kind: ReactionKind) -> PlatformResult<()>;

    /// Remove a reaction made by `actor`.
    async fn remove_reaction(
        &self,
        message: &MessageRef,
        kind: ReactionKind,
        actor: &str,
    ) -> PlatformResult<()>;

    /// Fetch a message by channel and id.
    async fn fetch_message(&self, channel_id: &str, message_id: &str) -> PlatformResult<Message>;

    /// Download an attachment's bytes to `dest`.
    async fn save_attachment(&self, attachment: &Attachment, dest: &Path) -> PlatformResult<()>;

    /// Acknowledge an interaction whose answer will follow later.
    async fn defer_interaction(&self, token: &InteractionToken) -> PlatformResult<()>;

    /// Send a follow-up answer to a deferred interaction.
    async fn send_followup(&self, token: &InteractionToken, text: &str) -> PlatformResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_value() {
        let control = SelectControl {
            options: vec![
                SelectOption {
                    label: "English".into(),
                    value: "en".into(),
                    default: false,
                },
                SelectOption {
                    label: "German".into(),
                    value: "de".into(),
                    default: true,
                },
            ],
            disabled: false,
        };
        assert_eq!(control.default_value(), Some("de"));
    }

    #[test]
    fn test_message_edit_builders() {
        assert_eq!(MessageEdit::remove_view().view, ViewEdit::Remove);
        assert!(MessageEdit::remove_view().content.is_none());
        assert_eq!(MessageEdit::default().view, ViewEdit::Keep);
    }
}
