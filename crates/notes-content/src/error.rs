//! Content reconstruction error types

/// Reconstruction errors, scoped to a single note or object
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Payload does not start with the gzip magic
    #[error("Malformed compressed data: {0}")]
    MalformedCompressedData(String),

    /// gzip stream could not be inflated
    #[error("Decompression error: {0}")]
    Decompression(#[from] std::io::Error),

    /// Protobuf decode failure
    #[error("Protobuf decode error: {0}")]
    ProtobufDecode(#[from] prost::DecodeError),

    /// Decoded protobuf lacks a required part
    #[error("Unexpected protobuf shape: {0}")]
    UnexpectedShape(String),

    /// Index-based reference points nowhere
    #[error("Missing cross reference: {0}")]
    MissingCrossReference(String),
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
