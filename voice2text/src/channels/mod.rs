//! Chat platform implementations.
//!
//! # Feature Flags
//!
//! - `telegram` - Telegram bot via teloxide

#[cfg(feature = "telegram")]
pub mod telegram;

#[cfg(feature = "telegram")]
pub use telegram::TelegramPlatform;
