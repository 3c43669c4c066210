//! Telegram platform implementation using teloxide.
//!
//! Maps the chat-platform surface onto the Telegram Bot API:
//!
//! - Voice notes carry the voice flag; private chats are direct channels.
//! - Reactions arrive as `message_reaction` updates. The bot must be an
//!   administrator of a group to receive them.
//! - The selector view is an inline keyboard; callback data encodes the
//!   [`ViewAction`].
//! - "Voice to text" is the `/transcribe` command sent as a reply to the
//!   target message. Deferring shows the typing indicator; follow-ups are
//!   replies to the command.
//!
//! # Setup
//!
//! 1. Create a bot via [@BotFather](https://t.me/botfather)
//! 2. Disable group privacy so the bot sees voice messages in groups
//! 3. Put the token in the config or `TELEGRAM_BOT_TOKEN`

use crate::bus::{EventBus, EventHandle};
use crate::config::{ControlsConfig, TelegramConfig};
use crate::error::{PlatformError, PlatformResult};
use crate::events::{
    self, Attachment, ChannelKind, ChatEvent, ComponentInteraction, ContextMenuInvocation,
    InteractionToken, MessageRef, ReactionEvent, ReactionKind, VOICE_MESSAGE_FLAG, ViewAction,
};
use crate::platform::{ChatPlatform, MessageEdit, SelectorView, ViewEdit};
use crate::util::truncate_chars;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use teloxide::dispatching::ShutdownToken;
use teloxide::error_handlers::LoggingErrorHandler;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{
    AllowedUpdate, ChatAction, ChatId, FileMeta, InlineKeyboardButton, InlineKeyboardMarkup,
    MessageId, MessageReactionUpdated, ReactionType, ReplyParameters,
};
use teloxide::update_listeners::Polling;
use teloxide::{ApiError, RequestError};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Telegram's message length limit.
pub const MAX_MESSAGE_LENGTH: usize = 4096;

/// Command that transcribes the replied-to message.
pub const TRANSCRIBE_COMMAND: &str = "/transcribe";

/// Bots may put a single reaction on a message.
const MAX_BOT_REACTIONS: usize = 1;

/// Messages remembered for fetches and downloads.
const MESSAGE_CACHE_CAPACITY: usize = 2048;

const LANGUAGES_PER_ROW: usize = 4;

const CALLBACK_PREFIX: &str = "v2t";
const CALLBACK_NOOP: &str = "v2t:noop";

// ============================================================================
// Callback data
// ============================================================================

fn encode_action(action: &ViewAction) -> String {
    match action {
        ViewAction::SelectLanguage(code) => format!("{CALLBACK_PREFIX}:lang:{code}"),
        ViewAction::SelectModel(id) => format!("{CALLBACK_PREFIX}:model:{id}"),
        ViewAction::Retranscribe => format!("{CALLBACK_PREFIX}:retranscribe"),
    }
}

fn parse_action(data: &str) -> Option<ViewAction> {
    let rest = data.strip_prefix(CALLBACK_PREFIX)?.strip_prefix(':')?;
    match rest.split_once(':') {
        Some(("lang", code)) if !code.is_empty() => Some(ViewAction::SelectLanguage(code.into())),
        Some(("model", id)) if !id.is_empty() => Some(ViewAction::SelectModel(id.into())),
        None if rest == "retranscribe" => Some(ViewAction::Retranscribe),
        _ => None,
    }
}

fn option_label(label: &str, default: bool) -> String {
    if default {
        format!("✓ {label}")
    } else {
        label.to_string()
    }
}

/// Render a selector view as an inline keyboard.
fn keyboard(view: &SelectorView) -> InlineKeyboardMarkup {
    let button = |label: String, action: ViewAction, disabled: bool| {
        let data = if disabled {
            CALLBACK_NOOP.to_string()
        } else {
            encode_action(&action)
        };
        InlineKeyboardButton::callback(label, data)
    };

    let mut rows: Vec<Vec<InlineKeyboardButton>> = view
        .language
        .options
        .chunks(LANGUAGES_PER_ROW)
        .map(|chunk| {
            chunk
                .iter()
                .map(|o| {
                    button(
                        option_label(&o.label, o.default),
                        ViewAction::SelectLanguage(o.value.clone()),
                        view.language.disabled,
                    )
                })
                .collect()
        })
        .collect();

    rows.push(
        view.model
            .options
            .iter()
            .map(|o| {
                button(
                    option_label(&o.label, o.default),
                    ViewAction::SelectModel(o.value.clone()),
                    view.model.disabled,
                )
            })
            .collect(),
    );

    let retranscribe = &view.retranscribe;
    let label = if retranscribe.disabled {
        format!("· {} ·", retranscribe.label)
    } else {
        format!("▶ {}", retranscribe.label)
    };
    rows.push(vec![button(label, ViewAction::Retranscribe, retranscribe.disabled)]);

    InlineKeyboardMarkup::new(rows)
}

// ============================================================================
// Identifiers
// ============================================================================

fn chat_id(channel_id: &str) -> PlatformResult<ChatId> {
    channel_id
        .parse()
        .map(ChatId)
        .map_err(|_| PlatformError::Internal(format!("invalid chat id: {channel_id}")))
}

fn message_id(id: &str) -> PlatformResult<MessageId> {
    id.parse()
        .map(MessageId)
        .map_err(|_| PlatformError::Internal(format!("invalid message id: {id}")))
}

fn address(message: &MessageRef) -> PlatformResult<(ChatId, MessageId)> {
    Ok((chat_id(&message.channel_id)?, message_id(&message.message_id)?))
}

fn message_ref(chat: ChatId, id: MessageId) -> MessageRef {
    MessageRef::new(chat.0.to_string(), id.0.to_string())
}

fn user_id(user: &teloxide::types::User) -> String {
    user.id.0.to_string()
}

fn is_not_modified(err: &RequestError) -> bool {
    matches!(err, RequestError::Api(ApiError::MessageNotModified))
}

// ============================================================================
// Message cache
// ============================================================================

/// Recently seen messages with the file handles of their attachments.
#[derive(Debug, Default)]
struct MessageCache {
    messages: HashMap<MessageRef, events::Message>,
    files: HashMap<String, FileMeta>,
    order: VecDeque<MessageRef>,
}

impl MessageCache {
    fn insert(&mut self, message: events::Message, files: Vec<(String, FileMeta)>) {
        let key = message.id.clone();
        if self.messages.insert(key.clone(), message).is_none() {
            self.order.push_back(key);
        }
        self.files.extend(files);

        while self.order.len() > MESSAGE_CACHE_CAPACITY {
            let Some(old) = self.order.pop_front() else { break };
            self.forget(&old);
        }
    }

    fn forget(&mut self, key: &MessageRef) {
        if let Some(old) = self.messages.remove(key) {
            for attachment in &old.attachments {
                self.files.remove(&attachment.id);
            }
        }
    }

    fn remove(&mut self, key: &MessageRef) {
        self.forget(key);
        self.order.retain(|k| k != key);
    }

    fn get(&self, key: &MessageRef) -> Option<&events::Message> {
        self.messages.get(key)
    }

    fn get_mut(&mut self, key: &MessageRef) -> Option<&mut events::Message> {
        self.messages.get_mut(key)
    }

    fn file(&self, attachment_id: &str) -> Option<&FileMeta> {
        self.files.get(attachment_id)
    }
}

/// Inline keyboards currently attached, kept so text edits can carry them.
/// The oldest entries are forgotten beyond [`MESSAGE_CACHE_CAPACITY`].
#[derive(Debug, Default)]
struct KeyboardCache {
    keyboards: HashMap<MessageRef, InlineKeyboardMarkup>,
    order: VecDeque<MessageRef>,
}

impl KeyboardCache {
    fn insert(&mut self, message: &MessageRef, keyboard: InlineKeyboardMarkup) {
        if self.keyboards.insert(message.clone(), keyboard).is_none() {
            self.order.push_back(message.clone());
        }
        while self.order.len() > MESSAGE_CACHE_CAPACITY {
            let Some(old) = self.order.pop_front() else { break };
            self.keyboards.remove(&old);
        }
    }

    fn get(&self, message: &MessageRef) -> Option<&InlineKeyboardMarkup> {
        self.keyboards.get(message)
    }

    fn remove(&mut self, message: &MessageRef) {
        if self.keyboards.remove(message).is_some() {
            self.order.retain(|k| k != message);
        }
    }
}

/// Control reactions the bot currently shows, oldest first.
#[derive(Debug, Default)]
struct BotReactions {
    shown: HashMap<MessageRef, Vec<ReactionKind>>,
}

impl BotReactions {
    /// Show `kind` on `message` as the newest reaction.
    fn add(&mut self, message: &MessageRef, kind: ReactionKind) -> Vec<ReactionKind> {
        let kinds = self.shown.entry(message.clone()).or_default();
        kinds.retain(|k| *k != kind);
        kinds.push(kind);
        kinds.clone()
    }

    /// Stop showing `kind`. `None` when the bot showed nothing on `message`.
    fn remove(&mut self, message: &MessageRef, kind: ReactionKind) -> Option<Vec<ReactionKind>> {
        let kinds = self.shown.get_mut(message)?;
        kinds.retain(|k| *k != kind);
        let left = kinds.clone();
        if left.is_empty() {
            self.shown.remove(message);
        }
        Some(left)
    }

    fn forget(&mut self, message: &MessageRef) {
        self.shown.remove(message);
    }
}

/// Audio-bearing media of a Telegram message, in a fixed order.
fn audio_files(msg: &Message) -> Vec<(FileMeta, Option<String>)> {
    let mut files = Vec::new();
    if let Some(voice) = msg.voice() {
        files.push((voice.file.clone(), None));
    }
    if let Some(audio) = msg.audio() {
        files.push((audio.file.clone(), audio.file_name.clone()));
    }
    if let Some(note) = msg.video_note() {
        files.push((note.file.clone(), Some("video_note.mp4".to_string())));
    }
    if let Some(doc) = msg.document() {
        let is_media = doc.mime_type.as_ref().is_some_and(|m| {
            let essence = m.essence_str();
            essence.starts_with("audio/") || essence.starts_with("video/")
        });
        if is_media {
            files.push((doc.file.clone(), doc.file_name.clone()));
        }
    }
    files
}

/// Convert a Telegram message, returning the file handles of its
/// attachments keyed by attachment id.
fn convert_message(msg: &Message) -> (events::Message, Vec<(String, FileMeta)>) {
    let id = message_ref(msg.chat.id, msg.id);
    let author = msg.from.as_ref().map(user_id).unwrap_or_default();

    let mut converted = events::Message::new(id, author)
        .with_content(msg.text().or_else(|| msg.caption()).unwrap_or_default());
    converted.channel_kind = if msg.chat.is_private() {
        ChannelKind::Direct
    } else {
        ChannelKind::Group
    };
    if msg.voice().is_some() {
        converted.flags |= VOICE_MESSAGE_FLAG;
    }
    if let Some(parent) = msg.reply_to_message() {
        converted.reference = Some(message_ref(parent.chat.id, parent.id));
    }

    let mut files = Vec::new();
    for (i, (meta, file_name)) in audio_files(msg).into_iter().enumerate() {
        let attachment_id = format!("{}-{}-{i}", msg.chat.id.0, msg.id.0);
        let mut attachment = Attachment::new(attachment_id.clone(), meta.unique_id.to_string())
            .with_size(u64::from(meta.size));
        if let Some(name) = file_name {
            attachment = attachment.with_file_name(name);
        }
        converted.attachments.push(attachment);
        files.push((attachment_id, meta));
    }
    (converted, files)
}

/// Whether `text` is the transcribe command, possibly addressed to a bot.
fn is_transcribe_command(text: &str) -> bool {
    text.split_whitespace()
        .next()
        .and_then(|word| word.split('@').next())
        .is_some_and(|command| command == TRANSCRIBE_COMMAND)
}

fn reaction_kind(controls: &ControlsConfig, reaction: &ReactionType) -> ReactionKind {
    match reaction {
        ReactionType::Emoji { emoji } if *emoji == controls.delete_emoji => {
            ReactionKind::DeleteControl
        }
        ReactionType::Emoji { emoji } if *emoji == controls.configure_emoji => {
            ReactionKind::ConfigureControl
        }
        _ => ReactionKind::Other,
    }
}

/// Reactions present in `after` but not in `before`.
fn reaction_diff<'a>(before: &[ReactionType], after: &'a [ReactionType]) -> Vec<&'a ReactionType> {
    after.iter().filter(|r| !before.contains(r)).collect()
}

// ============================================================================
// Platform
// ============================================================================

struct Shared {
    bot: Bot,
    bot_id: String,
    allow_from: Vec<String>,
    controls: ControlsConfig,
    cache: Mutex<MessageCache>,
    keyboards: Mutex<KeyboardCache>,
    bot_reactions: Mutex<BotReactions>,
}

impl Shared {
    fn is_allowed(&self, user: &str) -> bool {
        self.allow_from.is_empty() || self.allow_from.iter().any(|u| u == user)
    }

    async fn remember(&self, msg: &Message) -> events::Message {
        let (converted, files) = convert_message(msg);
        self.cache.lock().await.insert(converted.clone(), files);
        converted
    }

    fn emoji(&self, kind: ReactionKind) -> Option<String> {
        match kind {
            ReactionKind::DeleteControl => Some(self.controls.delete_emoji.clone()),
            ReactionKind::ConfigureControl => Some(self.controls.configure_emoji.clone()),
            ReactionKind::Other => None,
        }
    }

    /// Push the bot's reaction set for `message` to Telegram.
    async fn sync_reactions(&self, message: &MessageRef, kinds: &[ReactionKind]) -> PlatformResult<()> {
        let (chat, id) = address(message)?;
        let shown: Vec<ReactionType> = kinds
            .iter()
            .rev()
            .take(MAX_BOT_REACTIONS)
            .filter_map(|k| self.emoji(*k))
            .map(|emoji| ReactionType::Emoji { emoji })
            .collect();
        self.bot
            .set_message_reaction(chat, id)
            .reaction(shown)
            .await
            .map_err(|e| PlatformError::ReactionFailed(e.to_string()))?;
        Ok(())
    }
}

/// Telegram implementation of [`ChatPlatform`].
pub struct TelegramPlatform {
    shared: Arc<Shared>,
    shutdown: Mutex<Option<ShutdownToken>>,
}

impl std::fmt::Debug for TelegramPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramPlatform")
            .field("bot_id", &self.shared.bot_id)
            .field("allow_from", &self.shared.allow_from)
            .finish_non_exhaustive()
    }
}

impl TelegramPlatform {
    /// Connect with the configured token and learn the bot's own id.
    ///
    /// # Errors
    ///
    /// Fails when no token is configured or Telegram rejects it.
    pub async fn connect(config: &TelegramConfig, controls: &ControlsConfig) -> PlatformResult<Self> {
        let token = config
            .resolved_token()
            .ok_or_else(|| PlatformError::StartFailed("telegram token not configured".into()))?;
        let bot = Bot::new(token);
        let me = bot
            .get_me()
            .await
            .map_err(|e| PlatformError::StartFailed(e.to_string()))?;
        info!(bot = %me.username(), "connected to Telegram");

        Ok(Self {
            shared: Arc::new(Shared {
                bot,
                bot_id: user_id(&me.user),
                allow_from: config.allow_from.clone(),
                controls: controls.clone(),
                cache: Mutex::new(MessageCache::default()),
                keyboards: Mutex::new(KeyboardCache::default()),
                bot_reactions: Mutex::new(BotReactions::default()),
            }),
            shutdown: Mutex::new(None),
        })
    }

    async fn on_message(shared: &Shared, bus: &EventHandle, msg: &Message) {
        let Some(from) = msg.from.as_ref() else {
            return;
        };
        let author = user_id(from);
        if author == shared.bot_id {
            return;
        }
        if !shared.is_allowed(&author) {
            debug!(user = %author, chat = msg.chat.id.0, "message from unauthorized user");
            return;
        }

        let event = match (msg.text(), msg.reply_to_message()) {
            (Some(text), Some(target)) if is_transcribe_command(text) => {
                let target = shared.remember(target).await;
                ChatEvent::ContextMenuInvoked(ContextMenuInvocation {
                    token: InteractionToken {
                        id: msg.id.0.to_string(),
                        channel_id: msg.chat.id.0.to_string(),
                    },
                    user_id: author,
                    target,
                })
            }
            _ => ChatEvent::NewMessage(shared.remember(msg).await),
        };
        if let Err(e) = bus.publish(event).await {
            error!(error = %e, "failed to publish telegram message to bus");
        }
    }

    async fn on_reaction(shared: &Shared, bus: &EventHandle, update: &MessageReactionUpdated) {
        let Some(user) = update.user.as_ref() else {
            return;
        };
        let user = user_id(user);
        if !shared.is_allowed(&user) {
            return;
        }
        let message = message_ref(update.chat.id, update.message_id);

        let to_event = |r: &ReactionType| {
            ReactionEvent::new(message.clone(), &user, reaction_kind(&shared.controls, r))
        };
        let added = reaction_diff(&update.old_reaction, &update.new_reaction)
            .into_iter()
            .map(|r| ChatEvent::ReactionAdded(to_event(r)));
        let removed = reaction_diff(&update.new_reaction, &update.old_reaction)
            .into_iter()
            .map(|r| ChatEvent::ReactionRemoved(to_event(r)));

        for event in removed.chain(added) {
            if let Err(e) = bus.publish(event).await {
                error!(error = %e, "failed to publish telegram reaction to bus");
            }
        }
    }

    async fn on_callback(shared: &Shared, bus: &EventHandle, query: &CallbackQuery) {
        if let Err(e) = shared.bot.answer_callback_query(query.id.clone()).await {
            warn!(error = %e, "failed to answer callback query");
        }

        let user = user_id(&query.from);
        if !shared.is_allowed(&user) {
            return;
        }
        let (Some(data), Some(message)) = (query.data.as_deref(), query.message.as_ref()) else {
            return;
        };
        let Some(action) = parse_action(data) else {
            return;
        };

        let event = ChatEvent::Component(ComponentInteraction {
            reply: message_ref(message.chat().id, message.id()),
            user_id: user,
            action,
        });
        if let Err(e) = bus.publish(event).await {
            error!(error = %e, "failed to publish telegram callback to bus");
        }
    }
}

#[async_trait]
impl ChatPlatform for TelegramPlatform {
    fn name(&self) -> &'static str {
        "telegram"
    }

    fn bot_user_id(&self) -> &str {
        &self.shared.bot_id
    }

    async fn start(&self, bus: &EventBus) -> PlatformResult<()> {
        let bot = self.shared.bot.clone();

        let message_handler = {
            let shared = Arc::clone(&self.shared);
            let bus = bus.handle();
            Update::filter_message().endpoint(move |msg: Message| {
                let shared = Arc::clone(&shared);
                let bus = bus.clone();
                async move {
                    Self::on_message(&shared, &bus, &msg).await;
                    Ok::<(), RequestError>(())
                }
            })
        };

        let reaction_handler = {
            let shared = Arc::clone(&self.shared);
            let bus = bus.handle();
            Update::filter_message_reaction_updated().endpoint(move |update: MessageReactionUpdated| {
                let shared = Arc::clone(&shared);
                let bus = bus.clone();
                async move {
                    Self::on_reaction(&shared, &bus, &update).await;
                    Ok::<(), RequestError>(())
                }
            })
        };

        let callback_handler = {
            let shared = Arc::clone(&self.shared);
            let bus = bus.handle();
            Update::filter_callback_query().endpoint(move |query: CallbackQuery| {
                let shared = Arc::clone(&shared);
                let bus = bus.clone();
                async move {
                    Self::on_callback(&shared, &bus, &query).await;
                    Ok::<(), RequestError>(())
                }
            })
        };

        let handler = dptree::entry()
            .branch(message_handler)
            .branch(reaction_handler)
            .branch(callback_handler);

        let mut dispatcher = Dispatcher::builder(bot.clone(), handler).build();
        *self.shutdown.lock().await = Some(dispatcher.shutdown_token());

        let listener = Polling::builder(bot)
            .allowed_updates(vec![
                AllowedUpdate::Message,
                AllowedUpdate::CallbackQuery,
                AllowedUpdate::MessageReaction,
            ])
            .build();

        tokio::spawn(async move {
            dispatcher
                .dispatch_with_listener(
                    listener,
                    LoggingErrorHandler::with_custom_text("telegram update listener error"),
                )
                .await;
        });

        info!("Telegram platform started");
        Ok(())
    }

    async fn stop(&self) -> PlatformResult<()> {
        if let Some(token) = self.shutdown.lock().await.take() {
            match token.shutdown() {
                Ok(done) => done.await,
                Err(e) => debug!(error = %e, "dispatcher was not running"),
            }
        }
        info!("Telegram platform stopped");
        Ok(())
    }

    async fn send_reply(&self, parent: &MessageRef, text: &str) -> PlatformResult<MessageRef> {
        let (chat, parent_id) = address(parent)?;
        let sent = self
            .shared
            .bot
            .send_message(chat, truncate_chars(text, MAX_MESSAGE_LENGTH))
            .reply_parameters(ReplyParameters::new(parent_id))
            .await
            .map_err(|e| PlatformError::send(e.to_string()))?;
        let converted = self.shared.remember(&sent).await;
        Ok(converted.id)
    }

    async fn edit_message(&self, message: &MessageRef, edit: MessageEdit) -> PlatformResult<()> {
        let (chat, id) = address(message)?;
        let bot = &self.shared.bot;

        let markup = match &edit.view {
            ViewEdit::Keep => self.shared.keyboards.lock().await.get(message).cloned(),
            ViewEdit::Replace(view) => Some(keyboard(view)),
            ViewEdit::Remove => None,
        };

        let result = match (&edit.content, &edit.view) {
            (Some(text), _) => {
                let request = bot.edit_message_text(chat, id, truncate_chars(text, MAX_MESSAGE_LENGTH));
                match markup.clone() {
                    Some(kb) => request.reply_markup(kb).await.map(drop),
                    None => request.await.map(drop),
                }
            }
            (None, ViewEdit::Keep) => Ok(()),
            (None, _) => {
                let request = bot.edit_message_reply_markup(chat, id);
                match markup.clone() {
                    Some(kb) => request.reply_markup(kb).await.map(drop),
                    None => request.await.map(drop),
                }
            }
        };

        match result {
            Ok(()) => {}
            Err(e) if is_not_modified(&e) => debug!(message = %message, "message not modified"),
            Err(e) => return Err(PlatformError::edit(e.to_string())),
        }

        // only a keyboard Telegram accepted is kept for later text edits
        match (&edit.view, markup) {
            (ViewEdit::Replace(_), Some(kb)) => {
                self.shared.keyboards.lock().await.insert(message, kb);
            }
            (ViewEdit::Remove, _) => {
                self.shared.keyboards.lock().await.remove(message);
            }
            _ => {}
        }

        if let Some(text) = edit.content {
            if let Some(cached) = self.shared.cache.lock().await.get_mut(message) {
                cached.content = text;
            }
        }
        Ok(())
    }

    async fn delete_message(&self, message: &MessageRef) -> PlatformResult<()> {
        let (chat, id) = address(message)?;
        self.shared
            .bot
            .delete_message(chat, id)
            .await
            .map_err(|e| PlatformError::DeleteFailed(e.to_string()))?;

        self.shared.cache.lock().await.remove(message);
        self.shared.keyboards.lock().await.remove(message);
        self.shared.bot_reactions.lock().await.forget(message);
        Ok(())
    }

    async fn add_reaction(&self, message: &MessageRef, kind: ReactionKind) -> PlatformResult<()> {
        if kind == ReactionKind::Other {
            return Ok(());
        }
        let kinds = self.shared.bot_reactions.lock().await.add(message, kind);
        self.shared.sync_reactions(message, &kinds).await
    }

    async fn remove_reaction(
        &self,
        message: &MessageRef,
        kind: ReactionKind,
        actor: &str,
    ) -> PlatformResult<()> {
        if actor != self.shared.bot_id {
            return Err(PlatformError::ReactionFailed(
                "bots cannot remove reactions of other users".into(),
            ));
        }
        let Some(kinds) = self.shared.bot_reactions.lock().await.remove(message, kind) else {
            return Ok(());
        };
        self.shared.sync_reactions(message, &kinds).await
    }

    /// Telegram has no message lookup for bots, so only messages seen by
    /// this process can be resolved.
    async fn fetch_message(&self, channel_id: &str, message_id: &str) -> PlatformResult<events::Message> {
        let key = MessageRef::new(channel_id, message_id);
        self.shared
            .cache
            .lock()
            .await
            .get(&key)
            .cloned()
            .ok_or_else(|| PlatformError::not_found(key.to_string()))
    }

    async fn save_attachment(&self, attachment: &Attachment, dest: &Path) -> PlatformResult<()> {
        let meta = self
            .shared
            .cache
            .lock()
            .await
            .file(&attachment.id)
            .cloned()
            .ok_or_else(|| PlatformError::not_found(format!("attachment {}", attachment.id)))?;

        let file = self
            .shared
            .bot
            .get_file(meta.id)
            .await
            .map_err(|e| PlatformError::download(e.to_string()))?;

        let mut dst = tokio::fs::File::create(dest).await?;
        self.shared
            .bot
            .download_file(&file.path, &mut dst)
            .await
            .map_err(|e| PlatformError::download(e.to_string()))?;
        dst.flush().await?;
        Ok(())
    }

    async fn defer_interaction(&self, token: &InteractionToken) -> PlatformResult<()> {
        self.shared
            .bot
            .send_chat_action(chat_id(&token.channel_id)?, ChatAction::Typing)
            .await
            .map_err(|e| PlatformError::send(e.to_string()))?;
        Ok(())
    }

    async fn send_followup(&self, token: &InteractionToken, text: &str) -> PlatformResult<()> {
        self.shared
            .bot
            .send_message(chat_id(&token.channel_id)?, truncate_chars(text, MAX_MESSAGE_LENGTH))
            .reply_parameters(ReplyParameters::new(message_id(&token.id)?))
            .await
            .map_err(|e| PlatformError::send(e.to_string()))?;
        Ok(())
    }
}
