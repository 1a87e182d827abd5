use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chat::ChatPhase;
use crate::types::ClientLifecycleState;

/// Broad error category used for user-facing handling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClientErrorCategory {
    /// Invalid input, unsupported state, or other configuration issue.
    Config,
    /// Authentication/authorization failure.
    Auth,
    /// Input rejected before it reached the platform.
    Validation,
    /// Transient transport failure reaching the platform.
    Network,
    /// Platform store failure; the message is the platform's text verbatim.
    Storage,
    /// Serialization/deserialization failure.
    Serialization,
    /// Internal client bug or invariant break.
    Internal,
}

/// Stable client error payload emitted across the command/event boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{category:?}:{code}: {message}")]
pub struct ClientError {
    /// High-level error category.
    pub category: ClientErrorCategory,
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl ClientError {
    /// Construct a new client error.
    pub fn new(
        category: ClientErrorCategory,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Build a client-side validation error.
    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ClientErrorCategory::Validation, code, message)
    }

    /// Build a store error carrying the platform's failure text verbatim.
    pub fn store(message: impl Into<String>) -> Self {
        Self::new(ClientErrorCategory::Storage, "store_error", message)
    }

    /// Build a standard invalid-lifecycle-transition error.
    pub fn invalid_state(current: ClientLifecycleState, action: impl Into<String>) -> Self {
        let action = action.into();
        Self::new(
            ClientErrorCategory::Internal,
            "invalid_state_transition",
            format!("cannot run '{action}' while client is in state {current:?}"),
        )
    }

    /// Build a standard wrong-chat-phase error.
    pub fn invalid_phase(current: ChatPhase, action: impl Into<String>) -> Self {
        let action = action.into();
        Self::new(
            ClientErrorCategory::Internal,
            "invalid_chat_phase",
            format!("cannot run '{action}' while chat session is {current:?}"),
        )
    }
}

/// Whether retrying the failed command may recover.
///
/// Validation and state errors need different input, not a retry; transport
/// and store failures may clear up on their own.
pub fn is_recoverable(category: ClientErrorCategory) -> bool {
    matches!(
        category,
        ClientErrorCategory::Network | ClientErrorCategory::Storage
    )
}
