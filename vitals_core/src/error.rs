//! Error types for the vitals_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for vitals_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persistence layer error
    #[error("Store error: {0}")]
    Store(String),

    /// A referenced entity does not exist for this user
    #[error("Not found: {0}")]
    NotFound(String),

    /// A workout session transition that its current status forbids
    #[error("Invalid transition: cannot {action} a session that is {from}")]
    InvalidTransition { from: String, action: String },

    /// Rotation misconfiguration (e.g. a rotating group without variants)
    #[error("Rotation error: {0}")]
    Rotation(String),

    /// Every enabled channel failed, or none was enabled
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// A single channel provider failed
    #[error("Channel {channel} failed: {message}")]
    Channel { channel: String, message: String },

    /// Generic error
    #[error("{0}")]
    Other(String),
}
