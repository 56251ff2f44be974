//! Error types for the JSONL protocol.
//!
//! Routing failures never surface here; they travel back to the caller as
//! completion codes. These errors cover the wire itself.

use std::io;

use thiserror::Error;

/// Errors raised while reading, parsing or answering client messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The line was empty or not a valid client message.
    #[error("malformed JSONL: {message}")]
    MalformedJsonl {
        /// Parser diagnostic.
        message: String,
        /// Underlying parse failure, when one exists.
        #[source]
        source: Option<serde_json::Error>,
    },

    /// The line exceeded the per-message limit.
    #[error("request too large: exceeds {max_size} byte limit")]
    RequestTooLarge {
        /// Limit in bytes.
        max_size: usize,
    },

    /// The connection may not send this message.
    #[error("{operation} is accepted only from the bus bridge")]
    Forbidden {
        /// Rejected message kind.
        operation: &'static str,
    },

    /// Reading from or writing to the connection failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A daemon message could not be serialised.
    #[error("failed to serialize response: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl ProtocolError {
    /// Wraps a parse failure.
    pub fn from_json_error(source: serde_json::Error) -> Self {
        Self::MalformedJsonl {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Creates a malformed-line error with a custom message.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedJsonl {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a size-limit error.
    pub fn request_too_large(max_size: usize) -> Self {
        Self::RequestTooLarge { max_size }
    }

    /// Creates a rejection for a message reserved to the bus bridge.
    pub fn forbidden(operation: &'static str) -> Self {
        Self::Forbidden { operation }
    }

    /// Returns `true` when the connection can keep serving after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MalformedJsonl { .. } | Self::Forbidden { .. })
    }
}
