use crate::{
    error::ClientError,
    types::{ClientCommand, ClientEvent, ClientLifecycleState},
};

#[derive(Debug, Clone)]
pub struct ClientStateMachine {
    state: ClientLifecycleState,
}

impl Default for ClientStateMachine {
    fn default() -> Self {
        Self {
            state: ClientLifecycleState::SignedOut,
        }
    }
}

impl ClientStateMachine {
    pub fn state(&self) -> ClientLifecycleState {
        self.state
    }

    pub fn apply(&mut self, command: &ClientCommand) -> Result<Vec<ClientEvent>, ClientError> {
        use ClientCommand::*;

        match command {
            SignIn { .. } => self.transition_from_state(
                ClientLifecycleState::SignedOut,
                ClientLifecycleState::Authenticating,
                "sign_in",
            ),
            RecoverSession { .. } => self.transition_from_state(
                ClientLifecycleState::SignedOut,
                ClientLifecycleState::Recovering,
                "recover_session",
            ),
            ResetPassword { .. } => {
                if self.state == ClientLifecycleState::SignedOut {
                    Ok(Vec::new())
                } else {
                    Err(ClientError::invalid_state(self.state, "reset_password"))
                }
            }
            UpdatePassword { .. } => {
                if self.has_session() {
                    Ok(Vec::new())
                } else {
                    Err(ClientError::invalid_state(self.state, "update_password"))
                }
            }
            SignOut => self.transition_from_any_of(
                &[
                    ClientLifecycleState::Authenticated,
                    ClientLifecycleState::PasswordRecovery,
                ],
                ClientLifecycleState::SignedOut,
                "sign_out",
            ),
            LoadProfile
            | ListCategories
            | PostRequest { .. }
            | ListOpenRequests { .. }
            | ListMyRequests
            | SubmitOffer { .. }
            | ListOffers { .. }
            | AcceptOffer { .. }
            | SubmitReview { .. }
            | ListReviews { .. }
            | ListConversations
            | OpenChat { .. }
            | SendChatMessage { .. }
            | MarkChatRead
            | CloseChat
            | ListNotifications
            | MarkNotificationsRead => {
                if self.state == ClientLifecycleState::Authenticated {
                    Ok(Vec::new())
                } else {
                    Err(ClientError::invalid_state(
                        self.state,
                        "marketplace/chat command",
                    ))
                }
            }
        }
    }

    /// Resolve a pending sign-in or recovery flow.
    ///
    /// A successful sign-in lands on `Authenticated`; a successful token
    /// redemption lands on `PasswordRecovery`. Failure returns to
    /// `SignedOut` either way.
    pub fn on_auth_result(&mut self, success: bool) -> Result<ClientEvent, ClientError> {
        let next = match (self.state, success) {
            (ClientLifecycleState::Authenticating, true) => ClientLifecycleState::Authenticated,
            (ClientLifecycleState::Recovering, true) => ClientLifecycleState::PasswordRecovery,
            (ClientLifecycleState::Authenticating | ClientLifecycleState::Recovering, false) => {
                ClientLifecycleState::SignedOut
            }
            _ => return Err(ClientError::invalid_state(self.state, "on_auth_result")),
        };

        self.state = next;
        Ok(ClientEvent::StateChanged { state: next })
    }

    /// Resolve a successful password change.
    ///
    /// A recovery session is promoted to a regular authenticated one; a
    /// password change from `Authenticated` stays put.
    pub fn on_password_updated(&mut self) -> Option<ClientEvent> {
        if self.state != ClientLifecycleState::PasswordRecovery {
            return None;
        }
        self.state = ClientLifecycleState::Authenticated;
        Some(ClientEvent::StateChanged {
            state: ClientLifecycleState::Authenticated,
        })
    }

    pub fn on_fatal(&mut self) -> ClientEvent {
        self.state = ClientLifecycleState::Fatal;
        ClientEvent::StateChanged {
            state: ClientLifecycleState::Fatal,
        }
    }

    fn has_session(&self) -> bool {
        matches!(
            self.state,
            ClientLifecycleState::Authenticated | ClientLifecycleState::PasswordRecovery
        )
    }

    fn transition_from_state(
        &mut self,
        expected: ClientLifecycleState,
        next: ClientLifecycleState,
        action: &str,
    ) -> Result<Vec<ClientEvent>, ClientError> {
        if self.state != expected {
            return Err(ClientError::invalid_state(self.state, action));
        }
        self.state = next;
        Ok(vec![ClientEvent::StateChanged { state: next }])
    }

    fn transition_from_any_of(
        &mut self,
        expected: &[ClientLifecycleState],
        next: ClientLifecycleState,
        action: &str,
    ) -> Result<Vec<ClientEvent>, ClientError> {
        if !expected.contains(&self.state) {
            return Err(ClientError::invalid_state(self.state, action));
        }
        self.state = next;
        Ok(vec![ClientEvent::StateChanged { state: next }])
    }
}
