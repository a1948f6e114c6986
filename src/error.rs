//! Error types for the order bot.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),

    #[error("Order submission error: {0}")]
    Submit(#[from] SubmitError),
}

/// Configuration-related errors. Always fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },
}

/// Errors from the external asset lister.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("Listing {category} failed: {reason}")]
    ListFailed { category: String, reason: String },

    #[error("Listing {category} timed out after {timeout:?}")]
    Timeout { category: String, timeout: Duration },

    #[error("Invalid asset manifest: {0}")]
    InvalidManifest(String),
}

/// Errors from the order sink. All of them are retryable by re-confirming.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Order sink rejected the order: {0}")]
    Rejected(String),

    #[error("Order sink timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Per-step failures inside the order flow.
///
/// None of these escape the state machine: each one is turned into a message
/// for the customer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    /// Input did not fit the current step. State is left untouched.
    #[error("Unexpected input: {0}")]
    UserInput(String),

    /// A catalog lookup missed (unknown material or size).
    #[error("Not found: {0}")]
    NotFound(String),

    /// An external collaborator could not be reached.
    #[error("External service unavailable: {0}")]
    ExternalUnavailable(String),
}
