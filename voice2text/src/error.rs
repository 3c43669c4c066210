//! Unified error types for voice2text.
//!
//! Every module-specific error converts into [`BotError`], which is what the
//! router and gateway surface and log.

use std::fmt;

// ============================================================================
// Main Error Type
// ============================================================================

/// The main error type for voice2text operations.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    /// Chat platform (transport) error.
    #[error("platform: {0}")]
    Platform(#[from] PlatformError),

    /// Speech engine error.
    #[error("transcription: {0}")]
    Transcription(#[from] TranscriberError),

    /// Configuration error.
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    /// Event bus error.
    #[error("bus: {0}")]
    Bus(#[from] BusError),

    /// Contract violation, such as a voice message without exactly one
    /// attachment. Fatal to the operation and never retried.
    #[error("contract violation: {0}")]
    Contract(String),

    /// IO error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// Task join error.
    #[error("task: {0}")]
    Task(String),

    /// Generic internal error.
    #[error("{0}")]
    Internal(String),
}

impl BotError {
    /// Create a contract violation error.
    #[inline]
    pub fn contract(msg: impl Into<String>) -> Self {
        Self::Contract(msg.into())
    }

    /// Create a config error from a string.
    #[inline]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(ConfigError::Invalid(msg.into()))
    }

    /// Create an internal error.
    #[inline]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error is a contract violation.
    #[must_use]
    pub const fn is_contract_violation(&self) -> bool {
        matches!(self, Self::Contract(_))
    }
}

impl From<tokio::task::JoinError> for BotError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

/// Result type alias for voice2text operations.
pub type Result<T> = std::result::Result<T, BotError>;

// ============================================================================
// Event Bus Errors
// ============================================================================

/// Error type for event bus operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// The queue was closed.
    #[error("event queue closed")]
    Closed,
}

/// Result type for event bus operations.
pub type BusResult<T> = std::result::Result<T, BusError>;

// ============================================================================
// Platform Errors
// ============================================================================

/// Error type for chat platform operations.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// Failed to start the platform connection.
    #[error("start failed: {0}")]
    StartFailed(String),

    /// Failed to send a message.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Failed to edit a message.
    #[error("edit failed: {0}")]
    EditFailed(String),

    /// Failed to delete a message.
    #[error("delete failed: {0}")]
    DeleteFailed(String),

    /// Failed to add or remove a reaction.
    #[error("reaction failed: {0}")]
    ReactionFailed(String),

    /// Failed to download an attachment.
    #[error("download failed: {0}")]
    DownloadFailed(String),

    /// Message could not be resolved.
    #[error("message not found: {0}")]
    NotFound(String),

    /// Platform is not connected.
    #[error("not connected")]
    NotConnected,

    /// IO error while writing staged data.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error.
    #[error("{0}")]
    Internal(String),
}

impl PlatformError {
    /// Create a send failed error.
    #[inline]
    pub fn send(msg: impl Into<String>) -> Self {
        Self::SendFailed(msg.into())
    }

    /// Create an edit failed error.
    #[inline]
    pub fn edit(msg: impl Into<String>) -> Self {
        Self::EditFailed(msg.into())
    }

    /// Create a download failed error.
    #[inline]
    pub fn download(msg: impl Into<String>) -> Self {
        Self::DownloadFailed(msg.into())
    }

    /// Create a not found error.
    #[inline]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

/// Result type for platform operations.
pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

// ============================================================================
// Transcription Errors
// ============================================================================

/// Error type for speech engine operations.
#[derive(Debug, thiserror::Error)]
pub enum TranscriberError {
    /// API key not configured.
    #[error("API key not configured")]
    MissingApiKey,
    /// Audio file not found.
    #[error("file not found: {0}")]
    FileNotFound(String),
    /// Unsupported audio format.
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),
    /// Model is not in the registry.
    #[error("unknown model: {0}")]
    UnknownModel(String),
    /// API error.
    #[error("API error: {0}")]
    Api(String),
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Request error.
    #[error("request error: {0}")]
    Request(String),
}

/// Result type for transcription operations.
pub type TranscribeResult<T> = std::result::Result<T, TranscriberError>;

// ============================================================================
// Configuration Errors
// ============================================================================

/// Error type for configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("parse: {0}")]
    Parse(#[from] serde_json::Error),

    /// Missing required field.
    #[error("missing: {0}")]
    Missing(String),

    /// Invalid value.
    #[error("invalid: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Create a missing field error.
    #[inline]
    pub fn missing(field: impl Into<String>) -> Self {
        Self::Missing(field.into())
    }

    /// Create an invalid value error.
    #[inline]
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// ============================================================================
// Error Context Extension
// ============================================================================

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Add context to an error.
    ///
    /// # Errors
    ///
    /// Returns the wrapped error with the message prepended.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context using a closure (lazy evaluation).
    ///
    /// # Errors
    ///
    /// Returns the wrapped error with the produced message prepended.
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<BotError>> ErrorContext<T> for std::result::Result<T, E> {
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            BotError::Internal(format!("{}: {}", msg.into(), err))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            BotError::Internal(format!("{}: {}", f(), err))
        })
    }
}

// ============================================================================
// Display Helpers
// ============================================================================

/// A wrapper that displays errors in a user-friendly format.
#[derive(Debug)]
pub struct DisplayError<'a>(pub &'a BotError);

impl fmt::Display for DisplayError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            BotError::Platform(e) => write!(f, "Chat platform error: {e}"),
            BotError::Transcription(e) => write!(f, "Transcription error: {e}"),
            BotError::Config(e) => write!(f, "Configuration error: {e}"),
            BotError::Bus(e) => write!(f, "Event bus error: {e}"),
            BotError::Contract(e) => write!(f, "Unexpected message shape: {e}"),
            BotError::Io(e) => write!(f, "IO error: {e}"),
            BotError::Json(e) => write!(f, "JSON error: {e}"),
            BotError::Task(e) => write!(f, "Task error: {e}"),
            BotError::Internal(e) => write!(f, "Internal error: {e}"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversions() {
        let platform_err = PlatformError::NotConnected;
        let bot_err: BotError = platform_err.into();
        assert!(matches!(bot_err, BotError::Platform(_)));

        let engine_err = TranscriberError::MissingApiKey;
        let bot_err: BotError = engine_err.into();
        assert!(matches!(bot_err, BotError::Transcription(_)));
    }

    #[test]
    fn test_error_helpers() {
        let err = BotError::contract("2 attachments");
        assert!(err.is_contract_violation());
        assert_eq!(err.to_string(), "contract violation: 2 attachments");

        let err = BotError::config("invalid value");
        assert!(matches!(err, BotError::Config(_)));
        assert!(!err.is_contract_violation());
    }

    #[test]
    fn test_context() {
        let res: std::result::Result<(), PlatformError> = Err(PlatformError::send("boom"));
        let err = res.context("sending reply").unwrap_err();
        assert_eq!(err.to_string(), "sending reply: platform: send failed: boom");
    }

    #[test]
    fn test_display_error() {
        let err = BotError::contract("no attachment");
        assert_eq!(
            DisplayError(&err).to_string(),
            "Unexpected message shape: no attachment"
        );
    }
}
