use crate::{
    error::{self, ClientError},
    types::{ClientEvent, SendAck},
};

/// Internal helper describing a send command's result before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Send succeeded and produced a stored message ID.
    Success { message_id: String },
    /// Send failed with client error details.
    Failure { error: ClientError },
}

/// Convert a send command outcome to a stable `ClientEvent::SendAck`.
pub fn normalize_send_outcome(
    client_txn_id: impl Into<String>,
    outcome: SendOutcome,
) -> ClientEvent {
    let client_txn_id = client_txn_id.into();
    match outcome {
        SendOutcome::Success { message_id } => ClientEvent::SendAck(SendAck {
            client_txn_id,
            message_id: Some(message_id),
            error_code: None,
        }),
        SendOutcome::Failure { error } => ClientEvent::SendAck(SendAck {
            client_txn_id,
            message_id: None,
            error_code: Some(error.code),
        }),
    }
}

/// Convert a failed command's error into an `OperationFailed` event.
///
/// The recoverable flag is derived from the error category so every
/// emission site agrees on it.
pub fn normalize_operation_failure(error: ClientError) -> ClientEvent {
    ClientEvent::OperationFailed {
        recoverable: error::is_recoverable(error.category),
        code: error.code,
        message: error.message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientErrorCategory;

    #[test]
    fn maps_success_to_send_ack() {
        let event = normalize_send_outcome(
            "txn-1",
            SendOutcome::Success {
                message_id: "m-42".into(),
            },
        );

        match event {
            ClientEvent::SendAck(ack) => {
                assert_eq!(ack.client_txn_id, "txn-1");
                assert_eq!(ack.message_id.as_deref(), Some("m-42"));
                assert_eq!(ack.error_code, None);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn maps_failure_to_send_ack_with_stable_error_code() {
        let event = normalize_send_outcome(
            "txn-2",
            SendOutcome::Failure {
                error: ClientError::validation("empty_message", "message body must not be empty"),
            },
        );

        match event {
            ClientEvent::SendAck(ack) => {
                assert_eq!(ack.client_txn_id, "txn-2");
                assert_eq!(ack.message_id, None);
                assert_eq!(ack.error_code.as_deref(), Some("empty_message"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn derives_recoverable_flag_from_category() {
        let stored = normalize_operation_failure(ClientError::store("connection reset"));
        assert_eq!(
            stored,
            ClientEvent::OperationFailed {
                code: "store_error".into(),
                message: "connection reset".into(),
                recoverable: true,
            }
        );

        let invalid = normalize_operation_failure(ClientError::new(
            ClientErrorCategory::Validation,
            "invalid_rating",
            "rating must be between 1 and 5",
        ));
        match invalid {
            ClientEvent::OperationFailed { recoverable, .. } => assert!(!recoverable),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
