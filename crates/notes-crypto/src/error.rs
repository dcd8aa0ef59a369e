//! Error types

/// Crypto errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Keybag structure error
    #[error("Keybag error: {0}")]
    Keybag(String),

    /// Key derivation error
    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    /// Manifest property list error
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// Property list decode error
    #[error("Property list error: {0}")]
    Plist(#[from] plist::Error),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation was cancelled
    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
