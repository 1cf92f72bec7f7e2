//! Error types for the Taiyaku library.
//!
//! Uses `thiserror` for structured error definitions that provide
//! clear context about what went wrong.

use std::path::PathBuf;
use thiserror::Error;

/// Error type for parsing and persisting markup documents.
#[derive(Error, Debug)]
pub enum DocumentError {
    /// Markup could not be parsed even in recovery mode
    #[error("Failed to parse markup: {0}")]
    Parse(String),

    /// Reading or writing the backing file failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A required structural element is absent
    #[error("Element not found: {0}")]
    ElementNotFound(String),
}

/// Error type for resolving the root content descriptor of a container.
#[derive(Error, Debug)]
pub enum ContainerError {
    /// The pointer file has no usable rootfile entry
    #[error("No rootfile entry with a full-path in {container}")]
    MissingRootfile { container: PathBuf },

    /// The pointer file could not be read
    #[error("Failed to read container file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The pointer file or the descriptor it names could not be loaded
    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// Error type reported by a text provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// HTTP request to the API failed
    #[error("API request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Failed to parse the API response
    #[error("Failed to parse API response: {0}")]
    InvalidResponse(String),

    /// The provider answered with a different number of results than requested
    #[error("Expected {expected} translations, provider returned {actual}")]
    CountMismatch { expected: usize, actual: usize },

    /// Invalid provider configuration
    #[error("Invalid provider configuration: {0}")]
    InvalidConfig(String),
}

/// Error type for translation operations.
#[derive(Error, Debug)]
pub enum TranslationError {
    /// A provider call failed; `payloads` holds every string that was sent
    #[error("Translation provider failed on a batch of {} payloads: {source}", payloads.len())]
    Provider {
        #[source]
        source: ProviderError,
        payloads: Vec<String>,
    },

    /// The page markup could not be processed
    #[error("Failed to process page: {0}")]
    Document(#[from] DocumentError),
}

impl TranslationError {
    /// Returns the payloads of a failed provider call, if any.
    pub fn payloads(&self) -> Option<&[String]> {
        match self {
            TranslationError::Provider { payloads, .. } => Some(payloads),
            TranslationError::Document(_) => None,
        }
    }
}

/// Error type for book-level translation runs.
#[derive(Error, Debug)]
pub enum BookError {
    /// Root content descriptor could not be located
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// The content descriptor could not be loaded or saved
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// Translating a document or metadata field failed
    #[error("Failed to translate {target}: {source}")]
    Translation {
        target: String,
        #[source]
        source: TranslationError,
    },

    /// A content document could not be read or written
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Error type for configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Missing required configuration value
    #[error("Missing required config value: {0}")]
    MissingValue(String),

    /// Invalid configuration value
    #[error("Invalid config value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Config directory not found
    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Result type alias using anyhow for application-level error handling.
pub type Result<T> = anyhow::Result<T>;
