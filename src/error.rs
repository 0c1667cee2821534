//! Error types for the circles service.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Matching error: {0}")]
    Matching(#[from] MatchingError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
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

/// Errors surfaced by a matching run.
#[derive(Debug, thiserror::Error)]
pub enum MatchingError {
    #[error("city and state_code must be given together (city: {city:?}, state_code: {state_code:?})")]
    PartialLocation {
        city: Option<String>,
        state_code: Option<String>,
    },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Group notification errors.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Failed to send to {recipient}: {reason}")]
    SendFailed { recipient: String, reason: String },

    #[error("Invalid email address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("SMTP transport error: {0}")]
    Transport(String),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
