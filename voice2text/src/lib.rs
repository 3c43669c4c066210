//! voice2text - a chat bot that transcribes voice messages.
//!
//! Voice messages (and attachments sent in direct messages) are transcribed
//! with a Whisper-style speech engine and answered with a reply. Each reply
//! carries two reaction controls:
//!
//! - the **delete** control removes the reply;
//! - the **configure** control opens a selector for language and model, and
//!   a retranscribe button that rewrites the reply in place.
//!
//! # Architecture
//!
//! - **Event Bus** ([`bus`]) - Queue between the platform adapter and the gateway
//! - **Platform** ([`platform`], [`channels`]) - Chat platform surface and its Telegram implementation
//! - **Transcription** ([`transcription`], [`models`], [`staging`]) - Speech engine, model registry and attachment staging
//! - **Replies** ([`reply`]) - Per-reply state, reaction controls and the selector view
//! - **Router** ([`router`], [`pipeline`]) - Classifies events and runs the handlers
//! - **Gateway** ([`gateway`]) - Wires everything together and bounds concurrency
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use voice2text::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let gateway = GatewayBuilder::new().load_config(None).await?.build().await?;
//!     gateway.run().await
//! }
//! ```
//!
//! # Features
//!
//! - `telegram` - Telegram bot support via teloxide (default)

pub mod bus;
pub mod channels;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod gateway;
pub mod models;
pub mod pipeline;
pub mod platform;
pub mod reply;
pub mod router;
pub mod staging;
pub mod transcription;
pub mod util;

#[cfg(test)]
mod testing;

/// Prelude module for convenient imports.
pub mod prelude {
    // Error types (centralized)
    pub use crate::error::{
        BotError, BusError, BusResult, ConfigError, ConfigResult, ErrorContext, PlatformError,
        PlatformResult, Result, TranscribeResult, TranscriberError,
    };

    // Bus
    pub use crate::bus::{EventBus, EventHandle};

    // Platform
    #[cfg(feature = "telegram")]
    pub use crate::channels::TelegramPlatform;
    pub use crate::platform::{ChatPlatform, MessageEdit, SelectorView, ViewEdit};

    // Config
    pub use crate::config::{
        BotConfig, ControlsConfig, GatewaySettings, ModelConfig, TelegramConfig,
        TranscriptionConfig, config_path, init_config, load_config, load_config_from,
        save_config,
    };

    // Events
    pub use crate::events::{
        Attachment, ChatEvent, Message, MessageRef, ReactionEvent, ReactionKind, ViewAction,
    };

    // Gateway
    pub use crate::gateway::{Gateway, GatewayBuilder, GatewayStatus};

    // Transcription
    pub use crate::models::{ModelDescriptor, ModelRegistry};
    pub use crate::transcription::{
        LanguageCode, SpeechEngine, TranscriptionGateway, TranscriptionResult, WhisperApiEngine,
    };

    // Replies
    pub use crate::reply::{ReplyRecord, ReplyRegistry, ReplyState};
}
