//! Error types shared between the engine and transports.

use thiserror::Error;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors a [`Transport`](crate::Transport) may report while acknowledging an
/// interaction or delivering a reply.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The transport is not connected to its upstream.
    #[error("transport is not connected")]
    NotConnected,

    /// The interaction can no longer be answered (its response token expired).
    #[error("interaction '{interaction}' has expired")]
    Expired {
        /// Identifier of the expired interaction.
        interaction: String,
    },

    /// The upstream rejected the payload.
    #[error("reply rejected: {reason}")]
    Rejected {
        /// Reason given by the upstream.
        reason: String,
    },

    /// Delivery failed.
    #[error("failed to send reply: {0}")]
    SendFailed(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl TransportError {
    /// Creates a send failure with the given message.
    pub fn send_failed(msg: impl Into<String>) -> Self {
        Self::SendFailed(msg.into())
    }

    /// Creates a rejection with the given reason.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
