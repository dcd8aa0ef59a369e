//! Error types

/// Note store errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Schema layout matched no known generation and strict resolution was requested
    #[error("Schema unrecognized: {0}")]
    SchemaUnrecognized(String),

    /// Note content could not be reconstructed
    #[error("Content error: {0}")]
    Content(#[from] notes_content::Error),

    /// Keybag or key derivation failure
    #[error("Crypto error: {0}")]
    Crypto(#[from] notes_crypto::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Base64 decode error
    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Property list error
    #[error("Plist error: {0}")]
    Plist(#[from] plist::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
