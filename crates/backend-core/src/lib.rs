//! Core client contract shared between the runtime and frontend consumers.
//!
//! This crate defines the command/event protocol, lifecycle model, chat
//! session and conversation helpers, and common error/channel abstractions.
//! Nothing here talks to the platform; it is all pure state and plumbing.

/// Async command/event channel primitives.
pub mod channel;
/// Per-conversation chat session state.
pub mod chat;
/// Conversation-thread aggregation over the viewer's messages.
pub mod conversation;
/// Stable client error types.
pub mod error;
/// Event normalization helpers (for example send acknowledgements).
pub mod normalization;
/// Backoff used when the live feed falls behind.
pub mod retry;
/// Client lifecycle state machine.
pub mod state_machine;
/// Frontend-facing protocol types (commands, events, payloads).
pub mod types;
/// Client-side input checks run before any platform round trip.
pub mod validation;

pub use channel::{ClientChannelError, ClientChannels, EventStream};
pub use chat::{ChatPhase, ChatSession};
pub use conversation::{UNKNOWN_REQUEST_TITLE, UNKNOWN_USER_NAME, aggregate_conversations};
pub use error::{ClientError, ClientErrorCategory, is_recoverable};
pub use normalization::{SendOutcome, normalize_operation_failure, normalize_send_outcome};
pub use retry::ResyncBackoff;
pub use state_machine::ClientStateMachine;
pub use types::{
    Category, ChatMessage, ClientCommand, ClientEvent, ClientLifecycleState, ConversationSummary,
    Notification, NotificationKind, Offer, OfferStatus, Profile, RequestScope, RequestStatus,
    Review, SendAck, ServiceRequest, UserRole,
};
