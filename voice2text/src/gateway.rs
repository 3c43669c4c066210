//! Gateway service for running the complete bot.
//!
//! The gateway wires the pieces together:
//! - Model registry and speech engine behind the transcription gateway
//! - Chat platform and attachment stager
//! - Event bus feeding the router
//!
//! Events are handled concurrently, at most `max_in_flight` at a time.
//! Events acting on the same bot reply run one after another in arrival
//! order on that reply's lane.

use crate::bus::EventBus;
use crate::config::{BotConfig, load_config, load_config_from};
use crate::context::BotContext;
use crate::error::{BotError, ErrorContext, Result};
use crate::events::{ChatEvent, MessageRef};
use crate::models::ModelRegistry;
use crate::platform::ChatPlatform;
use crate::reply::ReplyRegistry;
use crate::router::EventRouter;
use crate::staging::AttachmentStager;
use crate::transcription::{SpeechEngine, TranscriptionGateway, WhisperApiEngine};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedSemaphorePermit, RwLock, Semaphore};
use tracing::{debug, error, info, warn};

/// Counters of handled events.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct HandlerStats {
    /// Events handled without error.
    pub handled: u64,
    /// Events whose handler failed.
    pub failed: u64,
    /// Retranscribe presses dropped because one was already pending.
    pub dropped: u64,
}

/// Events for one reply waiting behind the one being handled.
struct Lane {
    queue: VecDeque<(ChatEvent, OwnedSemaphorePermit)>,
    retranscribe_pending: bool,
}

type Lanes = Arc<Mutex<HashMap<MessageRef, Lane>>>;

/// Gateway service that runs the complete bot.
pub struct Gateway {
    config: BotConfig,
    bus: EventBus,
    platform: Arc<dyn ChatPlatform>,
    router: EventRouter,
    limiter: Arc<Semaphore>,
    max_in_flight: u32,
    lanes: Lanes,
    running: Arc<RwLock<bool>>,
    stats: Arc<RwLock<HandlerStats>>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("platform", &self.platform.name())
            .field("bus", &self.bus)
            .field("max_in_flight", &self.max_in_flight)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    /// Get a reference to the event bus.
    #[must_use]
    pub const fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Get a reference to the router.
    #[must_use]
    pub const fn router(&self) -> &EventRouter {
        &self.router
    }

    /// Run until Ctrl+C.
    ///
    /// # Errors
    ///
    /// Fails when the platform cannot be started.
    pub async fn run(&self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for ctrl-c");
            }
        })
        .await
    }

    /// Run until `shutdown` completes, then wait for in-flight events.
    ///
    /// # Errors
    ///
    /// Fails when the platform cannot be started.
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
        info!(platform = self.platform.name(), "Gateway starting...");
        self.platform.start(&self.bus).await?;
        *self.running.write().await = true;
        info!("Gateway started. Press Ctrl+C to stop.");

        tokio::pin!(shutdown);
        loop {
            let permit = tokio::select! {
                () = &mut shutdown => break,
                permit = Arc::clone(&self.limiter).acquire_owned() => {
                    permit.map_err(|_| BotError::internal("event limiter closed"))?
                }
            };
            let event = tokio::select! {
                () = &mut shutdown => break,
                event = self.bus.consume() => event,
            };
            let Some(event) = event else { break };
            self.admit(event, permit).await;
        }

        info!("Gateway stopping...");
        if let Err(e) = self.limiter.acquire_many(self.max_in_flight).await {
            warn!(error = %e, "could not wait for in-flight events");
        }
        if let Err(e) = self.platform.stop().await {
            warn!(error = %e, "failed to stop platform");
        }
        *self.running.write().await = false;
        info!("Gateway stopped");
        Ok(())
    }

    /// Start `event` now, or queue it behind earlier events for the same
    /// reply.
    async fn admit(&self, event: ChatEvent, permit: OwnedSemaphorePermit) {
        let router = self.router.clone();
        let stats = Arc::clone(&self.stats);
        let Some(key) = event.reply().cloned() else {
            tokio::spawn(async move {
                let _permit = permit;
                dispatch(&router, &stats, event).await;
            });
            return;
        };

        let retranscribe = event.is_retranscribe();
        let mut lanes = self.lanes.lock().await;
        if let Some(lane) = lanes.get_mut(&key) {
            if retranscribe && lane.retranscribe_pending {
                drop(lanes);
                debug!(reply = %key, "retranscribe already pending, dropped");
                self.stats.write().await.dropped += 1;
                return;
            }
            lane.retranscribe_pending |= retranscribe;
            lane.queue.push_back((event, permit));
            return;
        }
        lanes.insert(
            key.clone(),
            Lane {
                queue: VecDeque::new(),
                retranscribe_pending: retranscribe,
            },
        );
        drop(lanes);
        let lanes = Arc::clone(&self.lanes);
        tokio::spawn(run_lane(router, stats, lanes, key, event, permit));
    }

    /// Check if the gateway is running.
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Snapshot of the gateway.
    pub async fn status(&self) -> GatewayStatus {
        let bus = self.bus.stats().await;
        let handlers = *self.stats.read().await;
        let ctx = self.router.context();
        let registry = ctx.gateway.registry();

        GatewayStatus {
            running: *self.running.read().await,
            platform: self.platform.name().to_string(),
            models: registry.models().iter().map(|m| m.id.clone()).collect(),
            default_model: registry.default_model().id.clone(),
            device: registry.device().to_string(),
            live_replies: ctx.replies.len().await,
            events_published: bus.published,
            events_consumed: bus.consumed,
            handlers,
            max_in_flight: self.config.gateway.max_in_flight,
        }
    }
}

/// Handle the events of one reply in order until its queue is empty.
async fn run_lane(
    router: EventRouter,
    stats: Arc<RwLock<HandlerStats>>,
    lanes: Lanes,
    key: MessageRef,
    mut event: ChatEvent,
    mut permit: OwnedSemaphorePermit,
) {
    loop {
        let retranscribe = event.is_retranscribe();
        dispatch(&router, &stats, event).await;
        drop(permit);

        let mut lanes = lanes.lock().await;
        let Some(lane) = lanes.get_mut(&key) else {
            return;
        };
        if retranscribe {
            lane.retranscribe_pending = false;
        }
        match lane.queue.pop_front() {
            Some((next, next_permit)) => {
                event = next;
                permit = next_permit;
            }
            None => {
                lanes.remove(&key);
                return;
            }
        }
    }
}

async fn dispatch(router: &EventRouter, stats: &RwLock<HandlerStats>, event: ChatEvent) {
    let kind = event.kind();
    debug!(kind, actor = %event.actor_id(), "handling event");
    match router.handle(event).await {
        Ok(()) => stats.write().await.handled += 1,
        Err(e) => {
            if e.is_contract_violation() {
                error!(kind, error = %e, "event violates message contract");
            } else {
                error!(kind, error = %e, "event failed");
            }
            stats.write().await.failed += 1;
        }
    }
}

/// Gateway status information.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GatewayStatus {
    /// Whether the gateway is running.
    pub running: bool,
    /// Chat platform name.
    pub platform: String,
    /// Registered model ids.
    pub models: Vec<String>,
    /// Default model id.
    pub default_model: String,
    /// Inference device shared by the models.
    pub device: String,
    /// Replies with a live record.
    pub live_replies: usize,
    /// Events published on the bus.
    pub events_published: u64,
    /// Events taken off the bus.
    pub events_consumed: u64,
    /// Handler outcomes.
    pub handlers: HandlerStats,
    /// Concurrency bound.
    pub max_in_flight: usize,
}

/// Builder for creating a Gateway.
#[derive(Default)]
pub struct GatewayBuilder {
    config: BotConfig,
    platform: Option<Arc<dyn ChatPlatform>>,
    engine: Option<Arc<dyn SpeechEngine>>,
}

impl std::fmt::Debug for GatewayBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GatewayBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bot configuration.
    #[must_use]
    pub fn bot_config(mut self, config: BotConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `platform` instead of the configured one.
    #[must_use]
    pub fn platform(mut self, platform: Arc<dyn ChatPlatform>) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Use `engine` instead of the HTTP Whisper engine.
    #[must_use]
    pub fn engine(mut self, engine: Arc<dyn SpeechEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Load configuration from `path`, or the default location.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or is invalid.
    pub async fn load_config(mut self, path: Option<&Path>) -> Result<Self> {
        self.config = match path {
            Some(path) => load_config_from(path).await?,
            None => load_config().await?,
        };
        Ok(self)
    }

    /// Build the gateway, connecting to the chat platform if none was given.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration, when the staging directory cannot be
    /// created, or when the platform cannot connect.
    pub async fn build(self) -> Result<Gateway> {
        let config = self.config;
        config.validate()?;

        let registry = Arc::new(ModelRegistry::from_config(&config.transcription)?);
        let engine = self.engine.unwrap_or_else(|| {
            Arc::new(WhisperApiEngine::from_config(&config.transcription)) as Arc<dyn SpeechEngine>
        });
        if !engine.is_available() {
            warn!(engine = engine.name(), "speech engine is not configured");
        }

        let platform = match self.platform {
            Some(platform) => platform,
            None => connect_platform(&config).await?,
        };

        let stager = match &config.gateway.staging_dir {
            Some(dir) => AttachmentStager::in_dir(Arc::clone(&platform), dir)
                .with_context(|| format!("staging directory {}", dir.display()))?,
            None => AttachmentStager::temporary(Arc::clone(&platform))
                .context("temporary staging directory")?,
        };
        info!(
            models = registry.models().len(),
            default = %registry.default_model().id,
            device = registry.device(),
            staging = %stager.dir().display(),
            "transcription ready"
        );

        let gateway = TranscriptionGateway::new(engine, registry)
            .with_max_candidates(config.controls.max_candidates);

        let ctx = Arc::new(BotContext {
            platform: Arc::clone(&platform),
            gateway: Arc::new(gateway),
            stager: Arc::new(stager),
            replies: Arc::new(ReplyRegistry::new()),
            affordance_ttl: config.controls.affordance_ttl(),
        });

        let max_in_flight = u32::try_from(config.gateway.max_in_flight)
            .unwrap_or(u32::MAX)
            .clamp(1, u32::try_from(Semaphore::MAX_PERMITS).unwrap_or(u32::MAX));

        Ok(Gateway {
            bus: EventBus::with_capacity(config.gateway.queue_capacity),
            platform,
            router: EventRouter::new(ctx),
            limiter: Arc::new(Semaphore::new(max_in_flight as usize)),
            max_in_flight,
            lanes: Arc::new(Mutex::new(HashMap::new())),
            running: Arc::new(RwLock::new(false)),
            stats: Arc::new(RwLock::new(HandlerStats::default())),
            config,
        })
    }
}

#[cfg(feature = "telegram")]
async fn connect_platform(config: &BotConfig) -> Result<Arc<dyn ChatPlatform>> {
    use crate::channels::TelegramPlatform;

    if !config.telegram.enabled {
        return Err(BotError::config("no chat platform enabled"));
    }
    let platform = TelegramPlatform::connect(&config.telegram, &config.controls).await?;
    info!("Telegram platform enabled");
    Ok(Arc::new(platform))
}

#[cfg(not(feature = "telegram"))]
async fn connect_platform(_config: &BotConfig) -> Result<Arc<dyn ChatPlatform>> {
    Err(BotError::config(
        "no chat platform available, build with the `telegram` feature",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ComponentInteraction, ReactionEvent, ReactionKind, ViewAction};
    use crate::platform::MessageEdit;
    use crate::testing::{FakeEngine, FakePlatform, USER_ID, voice_message};
    use std::time::Duration;

    /// A bot reply to an inserted voice message that the registry has not
    /// seen yet.
    async fn unknown_reply(platform: &FakePlatform) -> MessageRef {
        let voice = voice_message("v1", 1);
        platform.insert_message(voice.clone());
        platform.send_reply(&voice.id, "hello").await.unwrap()
    }

    fn reaction(reply: &MessageRef, kind: ReactionKind) -> ReactionEvent {
        ReactionEvent::new(reply.clone(), USER_ID, kind)
    }

    fn component(reply: &MessageRef, action: ViewAction) -> ChatEvent {
        ChatEvent::Component(ComponentInteraction {
            reply: reply.clone(),
            user_id: USER_ID.into(),
            action,
        })
    }

    /// Run `gateway` until `count` events have an outcome.
    async fn run_until_settled(gateway: &Gateway, count: u64) {
        let settled = async {
            loop {
                let h = gateway.status().await.handlers;
                if h.handled + h.failed + h.dropped >= count {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(10), gateway.run_until(settled))
            .await
            .unwrap()
            .unwrap();
    }

    fn test_config() -> BotConfig {
        let mut config = BotConfig::default();
        config.controls.affordance_ttl_secs = 0;
        config
    }

    async fn build(platform: &Arc<FakePlatform>, engine: FakeEngine) -> Gateway {
        GatewayBuilder::new()
            .bot_config(test_config())
            .platform(Arc::clone(platform) as Arc<dyn ChatPlatform>)
            .engine(Arc::new(engine))
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = test_config();
        config.transcription.default_model = "missing".into();
        let err = GatewayBuilder::new()
            .bot_config(config)
            .platform(Arc::new(FakePlatform::new()))
            .engine(Arc::new(FakeEngine::new()))
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::Config(_)));
    }

    #[tokio::test]
    async fn test_events_are_handled() {
        let platform = Arc::new(FakePlatform::new());
        let gateway = build(&platform, FakeEngine::new()).await;

        for id in ["v1", "v2"] {
            gateway
                .bus()
                .publish(ChatEvent::NewMessage(voice_message(id, 1)))
                .await
                .unwrap();
        }
        gateway
            .bus()
            .publish(ChatEvent::NewMessage(voice_message("bad", 2)))
            .await
            .unwrap();

        gateway
            .run_until(tokio::time::sleep(Duration::from_millis(200)))
            .await
            .unwrap();

        assert_eq!(platform.replies().len(), 2);
        let status = gateway.status().await;
        assert!(!status.running);
        assert_eq!(status.events_consumed, 3);
        assert_eq!(status.handlers.handled, 2);
        assert_eq!(status.handlers.failed, 1);
        assert_eq!(status.live_replies, 2);
        assert_eq!(status.default_model, "turbo");
        assert_eq!(status.device, "remote");
    }

    #[tokio::test]
    async fn test_in_flight_events_finish_before_stop() {
        let platform = Arc::new(FakePlatform::new());
        let gateway = build(
            &platform,
            FakeEngine::new().with_delay(Duration::from_millis(100)),
        )
        .await;

        gateway
            .bus()
            .publish(ChatEvent::NewMessage(voice_message("v1", 1)))
            .await
            .unwrap();
        gateway
            .run_until(tokio::time::sleep(Duration::from_millis(20)))
            .await
            .unwrap();

        assert_eq!(platform.replies().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reaction_toggle_keeps_order() {
        for _ in 0..20 {
            let platform = Arc::new(FakePlatform::new());
            let gateway = build(&platform, FakeEngine::new()).await;
            let reply = unknown_reply(&platform).await;

            let configure = reaction(&reply, ReactionKind::ConfigureControl);
            gateway
                .bus()
                .publish(ChatEvent::ReactionAdded(configure.clone()))
                .await
                .unwrap();
            gateway
                .bus()
                .publish(ChatEvent::ReactionRemoved(configure))
                .await
                .unwrap();
            run_until_settled(&gateway, 2).await;

            assert_eq!(gateway.status().await.handlers.handled, 2);
            assert!(platform.current_view(&reply).is_none());
            let (_, last) = platform.edits().pop().unwrap();
            assert_eq!(last, MessageEdit::remove_view());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_voice_reply_toggle_keeps_order() {
        for _ in 0..20 {
            let platform = Arc::new(FakePlatform::new());
            let gateway = build(&platform, FakeEngine::new()).await;
            let voice = voice_message("v1", 1);
            platform.insert_message(voice.clone());
            gateway
                .router()
                .handle(ChatEvent::NewMessage(voice))
                .await
                .unwrap();
            let reply = platform.replies()[0].reply.clone();

            let configure = reaction(&reply, ReactionKind::ConfigureControl);
            for event in [
                ChatEvent::ReactionAdded(configure.clone()),
                ChatEvent::ReactionRemoved(configure.clone()),
                ChatEvent::ReactionAdded(configure.clone()),
                ChatEvent::ReactionRemoved(configure),
            ] {
                gateway.bus().publish(event).await.unwrap();
            }
            run_until_settled(&gateway, 4).await;

            assert_eq!(gateway.status().await.handlers.handled, 4);
            assert!(platform.current_view(&reply).is_none());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_second_retranscribe_press_dropped() {
        let platform = Arc::new(FakePlatform::new());
        let engine = Arc::new(FakeEngine::new().gated());
        let gateway = GatewayBuilder::new()
            .bot_config(test_config())
            .platform(Arc::clone(&platform) as Arc<dyn ChatPlatform>)
            .engine(Arc::clone(&engine) as Arc<dyn SpeechEngine>)
            .build()
            .await
            .unwrap();
        let reply = unknown_reply(&platform).await;

        for event in [
            ChatEvent::ReactionAdded(reaction(&reply, ReactionKind::ConfigureControl)),
            component(&reply, ViewAction::SelectLanguage("de".into())),
            component(&reply, ViewAction::SelectModel("turbo".into())),
            component(&reply, ViewAction::Retranscribe),
            component(&reply, ViewAction::Retranscribe),
        ] {
            gateway.bus().publish(event).await.unwrap();
        }

        let settled = async {
            engine.wait_started().await;
            while gateway.status().await.handlers.dropped == 0 {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            engine.release();
            loop {
                let h = gateway.status().await.handlers;
                if h.handled + h.failed + h.dropped >= 5 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(10), gateway.run_until(settled))
            .await
            .unwrap()
            .unwrap();

        let handlers = gateway.status().await.handlers;
        assert_eq!(handlers.handled, 4);
        assert_eq!(handlers.dropped, 1);
        assert_eq!(engine.transcribe_calls().len(), 1);
        assert_eq!(
            platform.current_text(&reply).as_deref(),
            Some("text from turbo (de)")
        );
    }
}
