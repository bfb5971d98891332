//! Error types for the matchmaking bot.

use crate::profile::UserId;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Token error: {0}")]
    Token(#[from] TokenError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Store-level errors for profiles and decisions.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// The underlying persistence could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Profile not found for user {user_id}")]
    NotFound { user_id: UserId },

    #[error("Profile already exists for user {user_id}")]
    DuplicateProfile { user_id: UserId },

    #[error("User {swiper} already decided on user {swiped}")]
    DuplicateDecision { swiper: UserId, swiped: UserId },

    #[error("Profile is incomplete: missing {missing}")]
    IncompleteProfile { missing: &'static str },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DatabaseError {
    /// Whether the failure is transient (the caller may retry the same operation).
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Query(_))
    }
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send message on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Callback button token errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Malformed button token: {0:?}")]
    Malformed(String),
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
