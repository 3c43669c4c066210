//! Inbound chat events.
//!
//! Platform adapters translate whatever their transport delivers into these
//! types and publish them on the [`EventBus`](crate::bus::EventBus). The
//! [`EventRouter`](crate::router::EventRouter) consumes them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// Platform flag bit marking a recorded voice message.
pub const VOICE_MESSAGE_FLAG: u64 = 1 << 13;

/// Address of a message: the channel it lives in and its id there.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    /// Channel (chat) identifier.
    pub channel_id: String,
    /// Message identifier within the channel.
    pub message_id: String,
}

impl MessageRef {
    /// Create a new message reference.
    pub fn new(channel_id: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            message_id: message_id.into(),
        }
    }
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.channel_id, self.message_id)
    }
}

/// Remote audio attachment. Only valid while its event is being handled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Attachment identifier.
    pub id: String,
    /// Size in bytes, if known.
    pub size: Option<u64>,
    /// Original file name, if any.
    pub file_name: Option<String>,
    /// Platform-specific handle used to download the bytes.
    pub source: String,
}

impl Attachment {
    /// Create an attachment reference.
    pub fn new(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            size: None,
            file_name: None,
            source: source.into(),
        }
    }

    /// Set the size.
    #[must_use]
    pub const fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Set the file name.
    #[must_use]
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }
}

/// Kind of channel a message arrived in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// One-to-one conversation with the bot.
    Direct,
    /// Group or server channel.
    #[default]
    Group,
}

/// A chat message as seen by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Where the message lives.
    pub id: MessageRef,
    /// Author's user id.
    pub author_id: String,
    /// Text content.
    #[serde(default)]
    pub content: String,
    /// Attachments, in platform order.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Message this one replies to, if any.
    pub reference: Option<MessageRef>,
    /// Platform flag bits.
    #[serde(default)]
    pub flags: u64,
    /// Kind of channel.
    #[serde(default)]
    pub channel_kind: ChannelKind,
    /// When the message was observed.
    pub timestamp: SystemTime,
}

impl Message {
    /// Create a message with no attachments in a group channel.
    pub fn new(id: MessageRef, author_id: impl Into<String>) -> Self {
        Self {
            id,
            author_id: author_id.into(),
            content: String::new(),
            attachments: Vec::new(),
            reference: None,
            flags: 0,
            channel_kind: ChannelKind::Group,
            timestamp: SystemTime::now(),
        }
    }

    /// Whether the platform flagged this as a voice message.
    #[must_use]
    pub const fn is_voice(&self) -> bool {
        self.flags & VOICE_MESSAGE_FLAG != 0
    }

    /// Whether the message arrived in a one-to-one channel.
    #[must_use]
    pub fn is_direct(&self) -> bool {
        self.channel_kind == ChannelKind::Direct
    }

    /// Mark as a voice message.
    #[must_use]
    pub const fn as_voice(mut self) -> Self {
        self.flags |= VOICE_MESSAGE_FLAG;
        self
    }

    /// Set the channel kind.
    #[must_use]
    pub const fn in_channel(mut self, kind: ChannelKind) -> Self {
        self.channel_kind = kind;
        self
    }

    /// Add an attachment.
    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Set the replied-to message.
    #[must_use]
    pub fn with_reference(mut self, reference: MessageRef) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Set the text content.
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// The single attachment, or `None` when there are zero or several.
    #[must_use]
    pub fn sole_attachment(&self) -> Option<&Attachment> {
        match self.attachments.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }
}

/// Reaction affordances the bot understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionKind {
    /// Deletes the bot reply.
    DeleteControl,
    /// Opens the model/language selector.
    ConfigureControl,
    /// Any other reaction.
    Other,
}

/// A reaction added to or removed from a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionEvent {
    /// Message that was reacted to.
    pub message: MessageRef,
    /// User who reacted.
    pub user_id: String,
    /// Classified reaction.
    pub kind: ReactionKind,
}

impl ReactionEvent {
    /// Create a reaction event.
    pub fn new(message: MessageRef, user_id: impl Into<String>, kind: ReactionKind) -> Self {
        Self {
            message,
            user_id: user_id.into(),
            kind,
        }
    }
}

/// Token for answering an interaction after it has been deferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionToken {
    /// Platform-specific interaction id.
    pub id: String,
    /// Channel the interaction came from.
    pub channel_id: String,
}

/// The "Voice to text" action invoked on an arbitrary message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextMenuInvocation {
    /// Interaction to defer and follow up on.
    pub token: InteractionToken,
    /// User who invoked the action.
    pub user_id: String,
    /// Message the action targets.
    pub target: Message,
}

/// What the user did on a selector view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "value", rename_all = "snake_case")]
pub enum ViewAction {
    /// Picked a language code.
    SelectLanguage(String),
    /// Picked a model id.
    SelectModel(String),
    /// Pressed the retranscribe button.
    Retranscribe,
}

/// An interaction with the selector view attached to a bot reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentInteraction {
    /// Reply message carrying the view.
    pub reply: MessageRef,
    /// User who interacted.
    pub user_id: String,
    /// What they did.
    pub action: ViewAction,
}

/// Everything the router can receive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A new message was posted.
    NewMessage(Message),
    /// A reaction was added.
    ReactionAdded(ReactionEvent),
    /// A reaction was removed.
    ReactionRemoved(ReactionEvent),
    /// The context-menu action was invoked.
    ContextMenuInvoked(ContextMenuInvocation),
    /// A selector view control was used.
    Component(ComponentInteraction),
}

impl ChatEvent {
    /// Short name for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NewMessage(_) => "new_message",
            Self::ReactionAdded(_) => "reaction_added",
            Self::ReactionRemoved(_) => "reaction_removed",
            Self::ContextMenuInvoked(_) => "context_menu",
            Self::Component(_) => "component",
        }
    }

    /// Bot reply the event acts on. New messages and context-menu
    /// invocations create replies rather than act on one.
    #[must_use]
    pub const fn reply(&self) -> Option<&MessageRef> {
        match self {
            Self::ReactionAdded(r) | Self::ReactionRemoved(r) => Some(&r.message),
            Self::Component(c) => Some(&c.reply),
            Self::NewMessage(_) | Self::ContextMenuInvoked(_) => None,
        }
    }

    /// Whether this is a press of the retranscribe button.
    #[must_use]
    pub fn is_retranscribe(&self) -> bool {
        matches!(self, Self::Component(c) if c.action == ViewAction::Retranscribe)
    }

    /// User responsible for the event.
    #[must_use]
    pub fn actor_id(&self) -> &str {
        match self {
            Self::NewMessage(m) => &m.author_id,
            Self::ReactionAdded(r) | Self::ReactionRemoved(r) => &r.user_id,
            Self::ContextMenuInvoked(c) => &c.user_id,
            Self::Component(c) => &c.user_id,
        }
    }
}
