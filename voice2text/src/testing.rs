//! In-memory platform and engine used by the unit tests.

use crate::bus::EventBus;
use crate::context::BotContext;
use crate::error::{PlatformError, PlatformResult, TranscribeResult, TranscriberError};
use crate::events::{
    Attachment, ChannelKind, InteractionToken, Message, MessageRef, ReactionKind,
};
use crate::models::{ModelDescriptor, ModelRegistry};
use crate::platform::{ChatPlatform, MessageEdit, SelectorView, ViewEdit};
use crate::reply::ReplyRegistry;
use crate::staging::AttachmentStager;
use crate::transcription::{
    LanguageProbability, SpeechEngine, TranscriptionGateway, TranscriptionResult,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

pub const BOT_ID: &str = "bot";
pub const USER_ID: &str = "user";
pub const CHANNEL: &str = "chat";

/// Registry with `small` (default) and `large` on one device.
pub fn test_registry() -> ModelRegistry {
    let model = |id: &str| ModelDescriptor {
        id: id.into(),
        engine_model: format!("whisper-{id}"),
        device: "cpu".into(),
    };
    ModelRegistry::new(vec![model("small"), model("large")], "small").unwrap()
}

/// Context over the fakes, without affordance timeout.
pub fn test_context(platform: &Arc<FakePlatform>, engine: &Arc<FakeEngine>) -> Arc<BotContext> {
    let platform = Arc::clone(platform) as Arc<dyn ChatPlatform>;
    let gateway = TranscriptionGateway::new(
        Arc::clone(engine) as Arc<dyn SpeechEngine>,
        Arc::new(test_registry()),
    );
    Arc::new(BotContext {
        stager: Arc::new(AttachmentStager::temporary(Arc::clone(&platform)).unwrap()),
        platform,
        gateway: Arc::new(gateway),
        replies: Arc::new(ReplyRegistry::new()),
        affordance_ttl: None,
    })
}

/// Voice message `id` in the test channel with `attachments` attachments.
pub fn voice_message(id: &str, attachments: usize) -> Message {
    let mut msg = Message::new(MessageRef::new(CHANNEL, id), USER_ID).as_voice();
    for i in 0..attachments {
        msg = msg.with_attachment(Attachment::new(format!("{id}-{i}"), format!("file-{id}-{i}")));
    }
    msg
}

/// Direct-channel message with plain attachments.
pub fn direct_message(id: &str, attachments: usize) -> Message {
    let mut msg = Message::new(MessageRef::new(CHANNEL, id), USER_ID).in_channel(ChannelKind::Direct);
    for i in 0..attachments {
        msg = msg.with_attachment(Attachment::new(format!("{id}-{i}"), format!("file-{id}-{i}")));
    }
    msg
}

// ============================================================================
// Platform
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentReply {
    pub parent: MessageRef,
    pub reply: MessageRef,
    pub text: String,
}

#[derive(Debug, Default)]
struct PlatformState {
    messages: HashMap<MessageRef, Message>,
    views: HashMap<MessageRef, SelectorView>,
    replies: Vec<SentReply>,
    edits: Vec<(MessageRef, MessageEdit)>,
    deleted: Vec<MessageRef>,
    reactions_added: Vec<(MessageRef, ReactionKind)>,
    reactions_removed: Vec<(MessageRef, ReactionKind, String)>,
    deferred: Vec<InteractionToken>,
    followups: Vec<(InteractionToken, String)>,
}

/// Records every call and serves fetches from what it has seen.
#[derive(Debug, Default)]
pub struct FakePlatform {
    state: Mutex<PlatformState>,
    next_id: AtomicU64,
    fetches: AtomicUsize,
    fail_downloads: AtomicBool,
    fail_sends: AtomicBool,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_message(&self, message: Message) {
        self.state.lock().unwrap().messages.insert(message.id.clone(), message);
    }

    pub fn fail_downloads(&self, fail: bool) {
        self.fail_downloads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn replies(&self) -> Vec<SentReply> {
        self.state.lock().unwrap().replies.clone()
    }

    pub fn edits(&self) -> Vec<(MessageRef, MessageEdit)> {
        self.state.lock().unwrap().edits.clone()
    }

    pub fn deleted(&self) -> Vec<MessageRef> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn reactions_added(&self) -> Vec<(MessageRef, ReactionKind)> {
        self.state.lock().unwrap().reactions_added.clone()
    }

    pub fn reactions_removed(&self) -> Vec<(MessageRef, ReactionKind, String)> {
        self.state.lock().unwrap().reactions_removed.clone()
    }

    pub fn deferred(&self) -> Vec<InteractionToken> {
        self.state.lock().unwrap().deferred.clone()
    }

    pub fn followups(&self) -> Vec<(InteractionToken, String)> {
        self.state.lock().unwrap().followups.clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn current_text(&self, message: &MessageRef) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .messages
            .get(message)
            .map(|m| m.content.clone())
    }

    pub fn current_view(&self, message: &MessageRef) -> Option<SelectorView> {
        self.state.lock().unwrap().views.get(message).cloned()
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn bot_user_id(&self) -> &'static str {
        BOT_ID
    }

    async fn start(&self, _bus: &EventBus) -> PlatformResult<()> {
        Ok(())
    }

    async fn stop(&self) -> PlatformResult<()> {
        Ok(())
    }

    async fn send_reply(&self, parent: &MessageRef, text: &str) -> PlatformResult<MessageRef> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(PlatformError::send("send disabled"));
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let reply = MessageRef::new(parent.channel_id.clone(), format!("r{n}"));
        let message = Message::new(reply.clone(), BOT_ID)
            .with_content(text)
            .with_reference(parent.clone());

        let mut state = self.state.lock().unwrap();
        state.messages.insert(reply.clone(), message);
        state.replies.push(SentReply {
            parent: parent.clone(),
            reply: reply.clone(),
            text: text.to_string(),
        });
        Ok(reply)
    }

    async fn edit_message(&self, message: &MessageRef, edit: MessageEdit) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        let Some(stored) = state.messages.get_mut(message) else {
            return Err(PlatformError::not_found(message.to_string()));
        };
        if let Some(content) = &edit.content {
            stored.content.clone_from(content);
        }
        match &edit.view {
            ViewEdit::Keep => {}
            ViewEdit::Replace(view) => {
                state.views.insert(message.clone(), view.clone());
            }
            ViewEdit::Remove => {
                state.views.remove(message);
            }
        }
        state.edits.push((message.clone(), edit));
        Ok(())
    }

    async fn delete_message(&self, message: &MessageRef) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.messages.remove(message).is_none() {
            return Err(PlatformError::not_found(message.to_string()));
        }
        state.views.remove(message);
        state.deleted.push(message.clone());
        Ok(())
    }

    async fn add_reaction(&self, message: &MessageRef, kind: ReactionKind) -> PlatformResult<()> {
        self.state
            .lock()
            .unwrap()
            .reactions_added
            .push((message.clone(), kind));
        Ok(())
    }

    async fn remove_reaction(
        &self,
        message: &MessageRef,
        kind: ReactionKind,
        actor: &str,
    ) -> PlatformResult<()> {
        self.state
            .lock()
            .unwrap()
            .reactions_removed
            .push((message.clone(), kind, actor.to_string()));
        Ok(())
    }

    async fn fetch_message(&self, channel_id: &str, message_id: &str) -> PlatformResult<Message> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let key = MessageRef::new(channel_id, message_id);
        self.state
            .lock()
            .unwrap()
            .messages
            .get(&key)
            .cloned()
            .ok_or_else(|| PlatformError::not_found(key.to_string()))
    }

    async fn save_attachment(&self, attachment: &Attachment, dest: &Path) -> PlatformResult<()> {
        if self.fail_downloads.load(Ordering::SeqCst) {
            tokio::fs::write(dest, b"partial").await?;
            return Err(PlatformError::download("download disabled"));
        }
        tokio::fs::write(dest, format!("audio:{}", attachment.id)).await?;
        Ok(())
    }

    async fn defer_interaction(&self, token: &InteractionToken) -> PlatformResult<()> {
        self.state.lock().unwrap().deferred.push(token.clone());
        Ok(())
    }

    async fn send_followup(&self, token: &InteractionToken, text: &str) -> PlatformResult<()> {
        self.state
            .lock()
            .unwrap()
            .followups
            .push((token.clone(), text.to_string()));
        Ok(())
    }
}

// ============================================================================
// Engine
// ============================================================================

#[derive(Debug, Clone)]
pub struct EngineCall {
    pub model: String,
    pub language: Option<String>,
    pub path: PathBuf,
    pub audio: Vec<u8>,
}

/// Scripted engine with a call log and a concurrency high-water mark.
#[derive(Debug)]
pub struct FakeEngine {
    text: Option<String>,
    probabilities: Vec<(String, f32)>,
    delay: Option<Duration>,
    gate: Option<Semaphore>,
    started: Notify,
    fail: AtomicBool,
    calls: Mutex<Vec<EngineCall>>,
    detect_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self {
            text: None,
            probabilities: vec![("en".into(), 0.6), ("de".into(), 0.3), ("fr".into(), 0.1)],
            delay: None,
            gate: None,
            started: Notify::new(),
            fail: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
            detect_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed transcription text.
    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_probabilities(mut self, probabilities: Vec<(&str, f32)>) -> Self {
        self.probabilities = probabilities
            .into_iter()
            .map(|(code, p)| (code.to_string(), p))
            .collect();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Hold every transcription until [`release`](Self::release).
    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    /// Let one held transcription finish.
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    /// Wait until a transcription has started.
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    pub fn fail_transcriptions(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn transcribe_calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn detect_calls(&self) -> usize {
        self.detect_calls.load(Ordering::SeqCst)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn occupy(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn vacate(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SpeechEngine for FakeEngine {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn transcribe(
        &self,
        audio: &Path,
        model: &ModelDescriptor,
        language: Option<&str>,
    ) -> TranscribeResult<TranscriptionResult> {
        self.calls.lock().unwrap().push(EngineCall {
            model: model.id.clone(),
            language: language.map(String::from),
            path: audio.to_path_buf(),
            audio: std::fs::read(audio).unwrap_or_default(),
        });
        self.occupy().await;
        self.started.notify_one();
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        self.vacate();

        if self.fail.load(Ordering::SeqCst) {
            return Err(TranscriberError::Api("engine down".into()));
        }
        let text = self.text.clone().unwrap_or_else(|| {
            format!("text from {} ({})", model.id, language.unwrap_or("auto"))
        });
        Ok(TranscriptionResult {
            text,
            duration: Some(1.0),
            language: language.map(String::from),
        })
    }

    async fn detect_languages(
        &self,
        _audio: &Path,
        _model: &ModelDescriptor,
    ) -> TranscribeResult<Vec<LanguageProbability>> {
        self.detect_calls.fetch_add(1, Ordering::SeqCst);
        self.occupy().await;
        self.vacate();
        Ok(self
            .probabilities
            .iter()
            .map(|(code, probability)| LanguageProbability {
                code: code.clone(),
                probability: *probability,
            })
            .collect())
    }
}
