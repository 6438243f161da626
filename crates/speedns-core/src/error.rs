//! Error types for speedns
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for speedns operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for speedns
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Measurement tool errors (missing executable, spawn failure)
    #[error("Measurement error: {0}")]
    Measurement(String),

    /// Endpoint pool errors (missing or unreadable address lists)
    #[error("Endpoint source error: {0}")]
    EndpointSource(String),

    /// Filesystem and process I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid schedule expression
    #[error("Invalid schedule '{expression}': {message}")]
    Schedule {
        /// The rejected expression
        expression: String,
        /// Parser message
        message: String,
    },

    /// Record or zone not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a measurement error
    pub fn measurement(msg: impl Into<String>) -> Self {
        Self::Measurement(msg.into())
    }

    /// Create an endpoint source error
    pub fn endpoint_source(msg: impl Into<String>) -> Self {
        Self::EndpointSource(msg.into())
    }

    /// Create a schedule error
    pub fn schedule(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schedule {
            expression: expression.into(),
            message: message.into(),
        }
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
