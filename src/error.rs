//! Error types for the Ava call assistant

use thiserror::Error;

/// Result type alias for Ava operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a call
#[derive(Debug, Error)]
pub enum Error {
    /// Speech capture is not available on this host
    #[error("unsupported environment: {0}")]
    UnsupportedEnvironment(String),

    /// A call is already active
    #[error("a call is already in progress")]
    CallInProgress,

    /// Speech recognition failed (not including "no speech" or "aborted")
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Conversational model query failed
    #[error("model query failed: {0}")]
    ModelQuery(String),

    /// Speech synthesis or playback failed
    #[error("synthesis failed: {0}")]
    Synthesis(String),

    /// Malformed base64 audio payload
    #[error("invalid encoding: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),

    /// Audio device or container error
    #[error("audio error: {0}")]
    Audio(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Persona not found or invalid
    #[error("persona error: {0}")]
    Persona(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
