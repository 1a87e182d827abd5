use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientErrorCategory};
use crate::types::ChatMessage;

/// Phase of an open chat session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChatPhase {
    /// History load in flight; sending is not possible yet.
    Loading,
    /// History loaded; sending is possible.
    Ready,
    /// A send is in flight; further sends are rejected until it resolves.
    Sending,
    /// Session closed; every operation is rejected.
    Closed,
}

/// In-memory state of one open conversation.
///
/// Scoped to a single (request, counterpart) pair for one viewer. Messages
/// are held ascending by creation time and deduplicated by ID, so a live
/// arrival racing the sender's own echo lands exactly once.
#[derive(Debug, Clone)]
pub struct ChatSession {
    viewer_id: String,
    request_id: String,
    counterpart_id: String,
    phase: ChatPhase,
    messages: Vec<ChatMessage>,
}

impl ChatSession {
    /// Start a session in `Loading` phase with no history yet.
    pub fn new(
        viewer_id: impl Into<String>,
        request_id: impl Into<String>,
        counterpart_id: impl Into<String>,
    ) -> Self {
        Self {
            viewer_id: viewer_id.into(),
            request_id: request_id.into(),
            counterpart_id: counterpart_id.into(),
            phase: ChatPhase::Loading,
            messages: Vec::new(),
        }
    }

    pub fn viewer_id(&self) -> &str {
        &self.viewer_id
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn counterpart_id(&self) -> &str {
        &self.counterpart_id
    }

    pub fn phase(&self) -> ChatPhase {
        self.phase
    }

    /// Current messages ascending by creation time.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Whether `message` belongs to this session's request and pair.
    pub fn accepts(&self, message: &ChatMessage) -> bool {
        message.is_between(&self.request_id, &self.viewer_id, &self.counterpart_id)
    }

    /// Replace the history with a freshly loaded snapshot.
    ///
    /// Used on open and again after a live-feed resync. The snapshot is
    /// normalized (sorted ascending, deduplicated by ID) before it is
    /// stored. A resync landing mid-send keeps the `Sending` phase so the
    /// in-flight gate is not lost.
    pub fn ready_with_history(&mut self, history: Vec<ChatMessage>) -> Result<(), ClientError> {
        if self.phase == ChatPhase::Closed {
            return Err(ClientError::invalid_phase(self.phase, "load_history"));
        }

        let mut history: Vec<ChatMessage> = history
            .into_iter()
            .filter(|m| self.accepts(m))
            .collect();
        history.sort_by(|a, b| {
            (a.created_at_ms, a.id.as_str()).cmp(&(b.created_at_ms, b.id.as_str()))
        });
        let mut seen = HashSet::new();
        history.retain(|m| seen.insert(m.id.clone()));

        self.messages = history;
        if self.phase == ChatPhase::Loading {
            self.phase = ChatPhase::Ready;
        }
        Ok(())
    }

    /// Insert one message, keeping creation-time order.
    ///
    /// Returns `Ok(true)` when the message was appended, `Ok(false)` when
    /// it was a duplicate or outside this session's scope.
    pub fn insert(&mut self, message: ChatMessage) -> Result<bool, ClientError> {
        if self.phase == ChatPhase::Closed {
            return Err(ClientError::invalid_phase(self.phase, "insert_message"));
        }
        if !self.accepts(&message) {
            return Ok(false);
        }
        if self.messages.iter().any(|m| m.id == message.id) {
            return Ok(false);
        }

        let idx = self.messages.partition_point(|m| {
            (m.created_at_ms, m.id.as_str()) <= (message.created_at_ms, message.id.as_str())
        });
        self.messages.insert(idx, message);
        Ok(true)
    }

    /// Enter the `Sending` phase.
    pub fn begin_send(&mut self) -> Result<(), ClientError> {
        match self.phase {
            ChatPhase::Ready => {
                self.phase = ChatPhase::Sending;
                Ok(())
            }
            ChatPhase::Sending => Err(ClientError::new(
                ClientErrorCategory::Internal,
                "send_in_flight",
                "a message send is already in flight",
            )),
            other => Err(ClientError::invalid_phase(other, "send_chat_message")),
        }
    }

    /// Leave the `Sending` phase whether the send succeeded or failed.
    pub fn finish_send(&mut self) {
        if self.phase == ChatPhase::Sending {
            self.phase = ChatPhase::Ready;
        }
    }

    /// Flip every unread incoming message to read; returns how many flipped.
    ///
    /// Running it again with no new arrivals returns zero.
    pub fn mark_incoming_read(&mut self) -> Result<u64, ClientError> {
        if self.phase == ChatPhase::Closed {
            return Err(ClientError::invalid_phase(self.phase, "mark_chat_read"));
        }

        let mut marked = 0;
        for message in &mut self.messages {
            if message.receiver_id == self.viewer_id && !message.is_read {
                message.is_read = true;
                marked += 1;
            }
        }
        Ok(marked)
    }

    /// Incoming messages still unread.
    pub fn unread_incoming(&self) -> u64 {
        self.messages
            .iter()
            .filter(|m| m.is_unread_for(&self.viewer_id))
            .count() as u64
    }

    /// Close the session; all further operations are rejected.
    pub fn close(&mut self) {
        self.phase = ChatPhase::Closed;
    }
}
