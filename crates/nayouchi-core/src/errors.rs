//! Error types for the Nayouchi session engine
//!
//! This module contains all error types used by the core and runtime crates:
//! caller-usage errors raised by the session state machine, transport errors
//! surfaced by the channel, backend rejections, and the `NayouchiError` type
//! that unifies them. None of these are fatal to a session.

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Precondition violations reported to the caller; session state is unchanged
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Operation '{operation}' requires an active group")]
    RequiresGroup { operation: &'static str },
    #[error("Operation '{operation}' requires an identified participant")]
    NotIdentified { operation: &'static str },
    #[error("Session is already identified as {participant}")]
    AlreadyIdentified { participant: String },
    #[error("Operation '{operation}' requires explicit confirmation")]
    ConfirmationRequired { operation: &'static str },
    #[error("Operation '{operation}' requires a non-empty value")]
    EmptyName { operation: &'static str },
    #[error("Operation '{operation}' requires a display name to be set first")]
    NameRequired { operation: &'static str },
    #[error("Operation '{operation}' is only available to initiators")]
    NotInitiator { operation: &'static str },
    #[error("Reply to '{operation}' was superseded by a newer navigation")]
    Superseded { operation: &'static str },
}

/// Errors raised by the transport channel
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Channel is not connected")]
    NotConnected,
    #[error("Connection lost before a reply to '{address}' arrived")]
    ConnectionLost { address: String },
    #[error("No reply to '{address}' after {duration_ms}ms")]
    Timeout { address: String, duration_ms: u64 },
    #[error("Channel closed: {reason}")]
    Closed { reason: String },
    #[error("WebSocket error: {reason}")]
    WebSocket { reason: String },
    #[error("Invalid endpoint URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Requests the backend answered with an error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("Backend rejected '{address}' (code {code}): {message}")]
    Rejected {
        address: String,
        code: i64,
        message: String,
    },
    #[error("Unexpected reply to '{address}': {reason}")]
    UnexpectedReply { address: String, reason: String },
}

// ----------------------------------------------------------------------------
// Unified Error
// ----------------------------------------------------------------------------

/// Core error type for the Nayouchi session engine
#[derive(Debug, thiserror::Error)]
pub enum NayouchiError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal task communication error
    #[error("Channel error: {message}")]
    Channel { message: String },

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl NayouchiError {
    /// Create a channel error with a message
    pub fn channel_error<T: Into<String>>(message: T) -> Self {
        NayouchiError::Channel {
            message: message.into(),
        }
    }

    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        NayouchiError::Configuration {
            reason: reason.into(),
        }
    }

    /// Create a backend rejection error
    pub fn rejected<A: Into<String>, M: Into<String>>(address: A, code: i64, message: M) -> Self {
        NayouchiError::Backend(BackendError::Rejected {
            address: address.into(),
            code,
            message: message.into(),
        })
    }

    /// Create an unexpected reply error
    pub fn unexpected_reply<A: Into<String>, R: Into<String>>(address: A, reason: R) -> Self {
        NayouchiError::Backend(BackendError::UnexpectedReply {
            address: address.into(),
            reason: reason.into(),
        })
    }

    /// Whether this is a caller-usage error rather than a runtime failure
    pub fn is_precondition(&self) -> bool {
        matches!(self, NayouchiError::Session(_))
    }

    /// Whether the error can be cured by retrying once connectivity returns
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NayouchiError::Transport(
                TransportError::NotConnected
                    | TransportError::ConnectionLost { .. }
                    | TransportError::Timeout { .. }
            )
        )
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, NayouchiError>;
pub type NayouchiResult<T> = Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let precondition: NayouchiError = SessionError::RequiresGroup { operation: "propose" }.into();
        assert!(precondition.is_precondition());
        assert!(!precondition.is_retryable());

        let lost: NayouchiError = TransportError::ConnectionLost {
            address: "enter".into(),
        }
        .into();
        assert!(lost.is_retryable());

        let rejected = NayouchiError::rejected("signup", -1, "mail failed");
        assert!(!rejected.is_precondition());
        assert!(rejected.to_string().contains("mail failed"));
    }
}
