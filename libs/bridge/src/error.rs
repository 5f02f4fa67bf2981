//! Bridge Error Types
//!
//! Two failure families reach a caller of the bridge: the channel itself
//! failing, and the remote resolver failing (reported through an error
//! envelope). Malformed inbound traffic is not an error at all; the
//! dispatcher simply ignores it.

use crate::channel::TargetId;
use crate::envelope::ErrorEnvelope;
use thiserror::Error;

/// Failure of the underlying send primitive
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The channel or the context behind it is gone
    #[error("Channel closed")]
    Closed,

    /// No listener on the other side produced a reply
    #[error("Could not establish connection: receiving end does not exist")]
    NoReceiver,

    /// The named target is not reachable through this channel
    #[error("Unknown target: {0}")]
    UnknownTarget(TargetId),

    /// Transport-specific failure
    #[error("Transport error: {0}")]
    Transport(String),
}

impl ChannelError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}

/// Main bridge error type
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Channel-level failure, passed through unchanged
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// The remote resolver threw or its deferred result failed
    #[error("Remote handler failed: {message}")]
    Remote {
        message: String,
        stack: Option<String>,
    },

    /// Typed payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A value does not have the shape of a bridge message
    #[error("Invalid message: {reason}")]
    InvalidMessage { reason: String },
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

impl BridgeError {
    /// Create an invalid message error
    pub fn invalid_message(reason: impl Into<String>) -> Self {
        Self::InvalidMessage {
            reason: reason.into(),
        }
    }

    /// Convert a received error envelope into a caller-facing failure
    pub fn remote(envelope: ErrorEnvelope) -> Self {
        Self::Remote {
            message: envelope.message,
            stack: envelope.stack,
        }
    }

    /// Check if the channel itself failed
    pub fn is_channel_error(&self) -> bool {
        matches!(self, Self::Channel(_))
    }

    /// Check if the remote resolver failed
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }

    /// Underlying channel failure, if any
    pub fn channel_error(&self) -> Option<&ChannelError> {
        match self {
            Self::Channel(err) => Some(err),
            _ => None,
        }
    }

    /// Rebuild the envelope carried by a remote failure
    pub fn as_envelope(&self) -> Option<ErrorEnvelope> {
        match self {
            Self::Remote { message, stack } => Some(ErrorEnvelope {
                message: message.clone(),
                stack: stack.clone(),
            }),
            _ => None,
        }
    }
}
