//! Per-reply state.

use crate::events::{Message, MessageRef};
use crate::transcription::LanguageCode;
use std::fmt;

/// Lifecycle of a bot reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyState {
    /// Reply sent, affordances not attached yet.
    Pending,
    /// Showing a transcription, no selector attached.
    Transcribed,
    /// Selector attached.
    Configuring,
    /// A retranscription is in flight.
    Retranscribing,
}

impl fmt::Display for ReplyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Transcribed => "transcribed",
            Self::Configuring => "configuring",
            Self::Retranscribing => "retranscribing",
        };
        f.write_str(s)
    }
}

/// Model and language captured when a retranscription starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetranscribeRequest {
    /// Model id.
    pub model: String,
    /// Language code.
    pub language: String,
}

/// State of one bot reply to a voice message.
///
/// Records live behind the per-reply gate of
/// [`ReplyRegistry`](super::ReplyRegistry); every method here assumes the
/// caller holds it.
#[derive(Debug, Clone)]
pub struct ReplyRecord {
    reply: MessageRef,
    source: MessageRef,
    cached_source: Option<Message>,
    state: ReplyState,
    selected_model: Option<String>,
    selected_language: Option<String>,
    candidate_languages: Vec<LanguageCode>,
    controls_enabled: bool,
    affordances_withdrawn: bool,
    closed: bool,
}

impl ReplyRecord {
    /// New pending record for `reply`, answering the voice message `source`.
    #[must_use]
    pub const fn new(reply: MessageRef, source: MessageRef) -> Self {
        Self {
            reply,
            source,
            cached_source: None,
            state: ReplyState::Pending,
            selected_model: None,
            selected_language: None,
            candidate_languages: Vec::new(),
            controls_enabled: true,
            affordances_withdrawn: false,
            closed: false,
        }
    }

    /// Record for a reply found after the fact, already showing its text.
    #[must_use]
    pub const fn adopted(reply: MessageRef, source: MessageRef) -> Self {
        let mut record = Self::new(reply, source);
        record.state = ReplyState::Transcribed;
        record
    }

    /// Keep the source message so later operations can skip the fetch.
    #[must_use]
    pub fn with_cached_source(mut self, message: Message) -> Self {
        self.cached_source = Some(message);
        self
    }

    /// Address of the reply.
    #[must_use]
    pub const fn reply(&self) -> &MessageRef {
        &self.reply
    }

    /// Address of the voice message being transcribed.
    #[must_use]
    pub const fn source(&self) -> &MessageRef {
        &self.source
    }

    /// Cached source message, if known.
    #[must_use]
    pub const fn cached_source(&self) -> Option<&Message> {
        self.cached_source.as_ref()
    }

    /// Remember the source message.
    pub fn cache_source(&mut self, message: Message) {
        self.cached_source = Some(message);
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ReplyState {
        self.state
    }

    /// Explicitly selected model.
    #[must_use]
    pub fn selected_model(&self) -> Option<&str> {
        self.selected_model.as_deref()
    }

    /// Explicitly selected language.
    #[must_use]
    pub fn selected_language(&self) -> Option<&str> {
        self.selected_language.as_deref()
    }

    /// Ranked candidate languages.
    #[must_use]
    pub fn candidate_languages(&self) -> &[LanguageCode] {
        &self.candidate_languages
    }

    /// Whether the selector controls accept interaction.
    #[must_use]
    pub const fn controls_enabled(&self) -> bool {
        self.controls_enabled
    }

    /// Whether the reply has been deleted.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether the bot took its reactions off the reply.
    #[must_use]
    pub const fn affordances_withdrawn(&self) -> bool {
        self.affordances_withdrawn
    }

    /// Whether a selector is attached.
    #[must_use]
    pub const fn is_configuring(&self) -> bool {
        matches!(
            self.state,
            ReplyState::Configuring | ReplyState::Retranscribing
        )
    }

    /// Whether the retranscribe action is actionable.
    #[must_use]
    pub const fn can_retranscribe(&self) -> bool {
        matches!(self.state, ReplyState::Configuring)
            && self.controls_enabled
            && self.selected_model.is_some()
            && self.selected_language.is_some()
    }

    /// Affordances are attached.
    pub fn mark_transcribed(&mut self) {
        if self.state == ReplyState::Pending {
            self.state = ReplyState::Transcribed;
        }
    }

    /// Attach a selector with `candidates`. Returns `false` when the reply
    /// is already configuring.
    pub fn begin_configuring(&mut self, candidates: Vec<LanguageCode>) -> bool {
        if matches!(
            self.state,
            ReplyState::Configuring | ReplyState::Retranscribing
        ) {
            return false;
        }
        self.state = ReplyState::Configuring;
        self.candidate_languages = candidates;
        self.selected_model = None;
        self.selected_language = None;
        self.controls_enabled = true;
        true
    }

    /// Detach the selector. Returns `false` when none was attached.
    pub fn end_configuring(&mut self) -> bool {
        if !matches!(
            self.state,
            ReplyState::Configuring | ReplyState::Retranscribing
        ) {
            return false;
        }
        self.state = ReplyState::Transcribed;
        self.candidate_languages.clear();
        self.selected_model = None;
        self.selected_language = None;
        self.controls_enabled = true;
        true
    }

    /// Select a language among the candidates.
    pub fn select_language(&mut self, code: &str) -> bool {
        if !self.accepts_selection() || !self.candidate_languages.iter().any(|l| l.code == code) {
            return false;
        }
        self.selected_language = Some(code.to_string());
        true
    }

    /// Select a model. The caller checks the id against the registry.
    pub fn select_model(&mut self, model_id: &str) -> bool {
        if !self.accepts_selection() {
            return false;
        }
        self.selected_model = Some(model_id.to_string());
        true
    }

    /// Enter [`ReplyState::Retranscribing`], disabling the controls.
    ///
    /// Returns `None` unless both a model and a language are selected.
    pub fn begin_retranscribe(&mut self) -> Option<RetranscribeRequest> {
        if !self.can_retranscribe() {
            return None;
        }
        let request = RetranscribeRequest {
            model: self.selected_model.clone()?,
            language: self.selected_language.clone()?,
        };
        self.state = ReplyState::Retranscribing;
        self.controls_enabled = false;
        Some(request)
    }

    /// Leave [`ReplyState::Retranscribing`], re-enabling the controls.
    pub fn finish_retranscribe(&mut self) {
        if self.state == ReplyState::Retranscribing {
            self.state = ReplyState::Configuring;
        }
        self.controls_enabled = true;
    }

    /// The bot's reactions are gone from the reply.
    pub fn withdraw_affordances(&mut self) {
        self.affordances_withdrawn = true;
    }

    /// Mark the reply as deleted.
    pub fn close(&mut self) {
        self.closed = true;
        self.controls_enabled = false;
    }

    fn accepts_selection(&self) -> bool {
        self.state == ReplyState::Configuring && self.controls_enabled && !self.closed
    }
}
